use std::collections::HashMap;

use crash_core::{user_key, CameraFollow, User};

/// Participants seen in a document. Keys are case-insensitive.
#[derive(Debug)]
pub struct Users {
    current: String,
    users: HashMap<String, User>,
}

impl Users {
    pub fn new(current: impl Into<String>) -> Self {
        let current = User::new(current);
        let name = current.name.clone();
        let mut users = HashMap::new();
        users.insert(user_key(&name), current);
        Self {
            current: name,
            users,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn is_current(&self, name: &str) -> bool {
        user_key(name) == user_key(&self.current)
    }

    /// Add `name` if it is non-blank and unseen. Returns whether it was added.
    pub fn add(&mut self, name: &str) -> bool {
        let user = User::new(name);
        if !user.is_valid() {
            return false;
        }
        let key = user_key(name);
        if self.users.contains_key(&key) {
            return false;
        }
        self.users.insert(key, user);
        true
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(&user_key(name))
    }

    pub fn set_camera_follow(&mut self, name: &str, follow: CameraFollow) -> bool {
        match self.users.get_mut(&user_key(name)) {
            Some(user) => {
                user.camera = follow;
                true
            }
            None => false,
        }
    }

    pub fn is_followed(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|user| user.camera == CameraFollow::Follow)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_case_insensitive() {
        let mut users = Users::new("Anna");
        assert!(users.add("Jack"));
        assert!(!users.add("JACK"));
        assert!(!users.add("anna"));
        assert!(!users.add("  "));
        assert_eq!(users.len(), 2);
        assert!(users.is_current("ANNA"));
    }

    #[test]
    fn test_follow() {
        let mut users = Users::new("Anna");
        users.add("Jack");
        assert!(!users.is_followed("Jack"));
        assert!(users.set_camera_follow("jack", CameraFollow::Follow));
        assert!(users.is_followed("Jack"));
        assert!(!users.set_camera_follow("Nobody", CameraFollow::Follow));
    }
}
