use serde::{Deserialize, Serialize};

/// How the local client treats another user's camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraFollow {
    /// Cameras are recorded but not shown.
    #[default]
    None,
    /// Cameras are shown to the local user.
    Visible,
    /// The local viewport tracks this user's camera.
    Follow,
}

/// A participant in a shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub visible: bool,
    pub camera: CameraFollow,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            camera: CameraFollow::None,
        }
    }

    /// Case-insensitive name match.
    pub fn is(&self, name: &str) -> bool {
        same_user(&self.name, name)
    }

    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Normalized key for a user name.
pub fn user_key(name: &str) -> String {
    name.to_lowercase()
}

/// User names compare case-insensitively.
pub fn same_user(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
