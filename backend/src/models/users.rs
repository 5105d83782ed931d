use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::constants::{ADMIN_ROLE, FALLBACK_DISPLAY_NAME};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub full_name: Option<String>,
    pub role: String,
    pub is_deleted: bool,
    #[serde(skip_serializing)]
    pub fcm_token: Option<String>,
    pub photos: Vec<Photo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }

    /// Device token for push delivery, if the user has registered one.
    pub fn notification_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|token| !token.is_empty())
    }

    /// First photo doubles as the profile image.
    pub fn profile_image_url(&self) -> Option<&str> {
        self.photos.first().map(|photo| photo.url.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Public projection of a user, safe to return to other users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i32,
    pub full_name: Option<String>,
    pub photos: Vec<Photo>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            photos: user.photos.clone(),
        }
    }
}
