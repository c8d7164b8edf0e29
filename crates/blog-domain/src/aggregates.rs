//! Blog aggregates.
//!
//! Each mutating method validates, applies the change and raises exactly one
//! domain event. Nothing here touches storage.

use crate::events::*;
use crate::{DomainError, DomainResult};
use chrono::Utc;
use uuid::Uuid;

const EXCERPT_CHARS: usize = 80;

/// An entity that owns a buffer of uncommitted domain events.
pub trait Aggregate {
    /// Entity type name (`category`, `post`, ...).
    fn aggregate_type(&self) -> &'static str;

    fn id(&self) -> &str;

    fn events(&self) -> &EventBuffer;

    fn events_mut(&mut self) -> &mut EventBuffer;

    /// True once `delete` was called; persistence removes the row.
    fn is_deleted(&self) -> bool;
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn require(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Lowercase, ASCII-alphanumeric slug with single dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

// ==========================================
// Category
// ==========================================

#[derive(Debug, Clone)]
pub struct Category {
    id: String,
    name: String,
    slug: String,
    deleted: bool,
    events: EventBuffer,
}

impl Category {
    pub fn create(name: &str, actor_id: &str) -> DomainResult<Self> {
        require("category name", name)?;
        let mut category = Self {
            id: new_id(),
            name: name.trim().to_string(),
            slug: slugify(name),
            deleted: false,
            events: EventBuffer::new(),
        };
        category
            .events
            .raise(DomainEvent::CategoryCreated(CategoryCreated {
                category_id: category.id.clone(),
                name: category.name.clone(),
                slug: category.slug.clone(),
                actor_id: actor_id.to_string(),
                occurred_at: Utc::now(),
            }));
        Ok(category)
    }

    /// Rebuild a stored category. Raises nothing.
    pub fn restore(id: String, name: String, slug: String) -> Self {
        Self {
            id,
            name,
            slug,
            deleted: false,
            events: EventBuffer::new(),
        }
    }

    pub fn rename(&mut self, name: &str, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        require("category name", name)?;
        let previous_name = std::mem::replace(&mut self.name, name.trim().to_string());
        self.slug = slugify(name);
        self.events.raise(DomainEvent::CategoryUpdated(CategoryUpdated {
            category_id: self.id.clone(),
            name: self.name.clone(),
            previous_name,
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn delete(&mut self, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        self.deleted = true;
        self.events.raise(DomainEvent::CategoryDeleted(CategoryDeleted {
            category_id: self.id.clone(),
            name: self.name.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn ensure_live(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::Deleted {
                entity: "Category",
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl Aggregate for Category {
    fn aggregate_type(&self) -> &'static str {
        "category"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn events(&self) -> &EventBuffer {
        &self.events
    }
    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

// ==========================================
// Post
// ==========================================

/// Publication state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    id: String,
    title: String,
    body: String,
    category_id: Option<String>,
    author_id: String,
    status: PostStatus,
    view_count: i64,
    deleted: bool,
    events: EventBuffer,
}

impl Post {
    pub fn create(
        title: &str,
        body: &str,
        category_id: Option<&str>,
        author_id: &str,
    ) -> DomainResult<Self> {
        require("post title", title)?;
        require("author id", author_id)?;
        let mut post = Self {
            id: new_id(),
            title: title.trim().to_string(),
            body: body.to_string(),
            category_id: category_id.map(str::to_string),
            author_id: author_id.to_string(),
            status: PostStatus::Draft,
            view_count: 0,
            deleted: false,
            events: EventBuffer::new(),
        };
        post.events.raise(DomainEvent::PostCreated(PostCreated {
            post_id: post.id.clone(),
            title: post.title.clone(),
            category_id: post.category_id.clone(),
            author_id: post.author_id.clone(),
            occurred_at: Utc::now(),
        }));
        Ok(post)
    }

    /// Rebuild a stored post. Raises nothing.
    pub fn restore(
        id: String,
        title: String,
        body: String,
        category_id: Option<String>,
        author_id: String,
        status: PostStatus,
        view_count: i64,
    ) -> Self {
        Self {
            id,
            title,
            body,
            category_id,
            author_id,
            status,
            view_count,
            deleted: false,
            events: EventBuffer::new(),
        }
    }

    pub fn edit(&mut self, title: &str, body: &str, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        require("post title", title)?;
        self.title = title.trim().to_string();
        self.body = body.to_string();
        self.events.raise(DomainEvent::PostUpdated(PostUpdated {
            post_id: self.id.clone(),
            title: self.title.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn publish(&mut self, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        if self.status == PostStatus::Published {
            return Err(DomainError::AlreadyPublished(self.id.clone()));
        }
        self.status = PostStatus::Published;
        self.events.raise(DomainEvent::PostPublished(PostPublished {
            post_id: self.id.clone(),
            title: self.title.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn record_view(&mut self, viewer_id: Option<&str>) -> DomainResult<()> {
        self.ensure_live()?;
        self.view_count += 1;
        self.events.raise(DomainEvent::PostViewed(PostViewed {
            post_id: self.id.clone(),
            viewer_id: viewer_id.map(str::to_string),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn delete(&mut self, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        self.deleted = true;
        self.events.raise(DomainEvent::PostDeleted(PostDeleted {
            post_id: self.id.clone(),
            title: self.title.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn category_id(&self) -> Option<&str> {
        self.category_id.as_deref()
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn status(&self) -> PostStatus {
        self.status
    }

    pub fn view_count(&self) -> i64 {
        self.view_count
    }

    fn ensure_live(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::Deleted {
                entity: "Post",
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl Aggregate for Post {
    fn aggregate_type(&self) -> &'static str {
        "post"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn events(&self) -> &EventBuffer {
        &self.events
    }
    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

// ==========================================
// Comment
// ==========================================

#[derive(Debug, Clone)]
pub struct Comment {
    id: String,
    post_id: String,
    author_id: String,
    body: String,
    deleted: bool,
    events: EventBuffer,
}

impl Comment {
    pub fn add(post_id: &str, author_id: &str, body: &str) -> DomainResult<Self> {
        require("comment body", body)?;
        require("post id", post_id)?;
        let mut comment = Self {
            id: new_id(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            body: body.to_string(),
            deleted: false,
            events: EventBuffer::new(),
        };
        comment.events.raise(DomainEvent::CommentAdded(CommentAdded {
            comment_id: comment.id.clone(),
            post_id: comment.post_id.clone(),
            author_id: comment.author_id.clone(),
            excerpt: comment.body.chars().take(EXCERPT_CHARS).collect(),
            occurred_at: Utc::now(),
        }));
        Ok(comment)
    }

    /// Rebuild a stored comment. Raises nothing.
    pub fn restore(id: String, post_id: String, author_id: String, body: String) -> Self {
        Self {
            id,
            post_id,
            author_id,
            body,
            deleted: false,
            events: EventBuffer::new(),
        }
    }

    pub fn delete(&mut self, actor_id: &str) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::Deleted {
                entity: "Comment",
                id: self.id.clone(),
            });
        }
        self.deleted = true;
        self.events.raise(DomainEvent::CommentDeleted(CommentDeleted {
            comment_id: self.id.clone(),
            post_id: self.post_id.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Aggregate for Comment {
    fn aggregate_type(&self) -> &'static str {
        "comment"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn events(&self) -> &EventBuffer {
        &self.events
    }
    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

// ==========================================
// User
// ==========================================

/// Permission level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Author,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Author => "author",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "reader" => Ok(Self::Reader),
            "author" => Ok(Self::Author),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    id: String,
    username: String,
    email: String,
    role: Role,
    deleted: bool,
    events: EventBuffer,
}

impl User {
    pub fn register(username: &str, email: &str) -> DomainResult<Self> {
        require("username", username)?;
        if !email.contains('@') {
            return Err(DomainError::Validation(format!("invalid email: {email}")));
        }
        let mut user = Self {
            id: new_id(),
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            role: Role::Reader,
            deleted: false,
            events: EventBuffer::new(),
        };
        user.events.raise(DomainEvent::UserRegistered(UserRegistered {
            user_id: user.id.clone(),
            username: user.username.clone(),
            occurred_at: Utc::now(),
        }));
        Ok(user)
    }

    /// Rebuild a stored user. Raises nothing.
    pub fn restore(id: String, username: String, email: String, role: Role) -> Self {
        Self {
            id,
            username,
            email,
            role,
            deleted: false,
            events: EventBuffer::new(),
        }
    }

    /// Change the user's role. Assigning the current role is a no-op.
    pub fn change_role(&mut self, role: Role, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        if self.role == role {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.role, role);
        self.events.raise(DomainEvent::UserRoleChanged(UserRoleChanged {
            user_id: self.id.clone(),
            username: self.username.clone(),
            previous_role: previous.as_str().to_string(),
            new_role: role.as_str().to_string(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn delete(&mut self, actor_id: &str) -> DomainResult<()> {
        self.ensure_live()?;
        self.deleted = true;
        self.events.raise(DomainEvent::UserDeleted(UserDeleted {
            user_id: self.id.clone(),
            username: self.username.clone(),
            actor_id: actor_id.to_string(),
            occurred_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn ensure_live(&self) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::Deleted {
                entity: "User",
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl Aggregate for User {
    fn aggregate_type(&self) -> &'static str {
        "user"
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn events(&self) -> &EventBuffer {
        &self.events
    }
    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
