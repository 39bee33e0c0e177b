//! Registry key layout.
//!
//! ```text
//! <root>/machines/<host_id>/awsinfo
//! <root>/machines/<host_id>/containers/<container_id>
//! ```
//!
//! Keys are pure functions of (root, host id, container id), so repeating a
//! write for the same container overwrites its entry instead of duplicating it.
//! Host and container ids are opaque and always occupy exactly one segment:
//! they are percent-encoded, so `tcp://10.0.0.5:2375` cannot open a directory.

use crate::types::ContainerId;

/// Builds registry keys for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    root: String,
    host_id: String,
}

impl KeyLayout {
    pub fn new(root: &str, host_id: &str) -> Self {
        let root = root.trim_end_matches('/');
        let root = if root.starts_with('/') {
            root.to_string()
        } else {
            format!("/{root}")
        };
        Self {
            root,
            host_id: host_id.to_string(),
        }
    }

    /// The host id as given, before encoding.
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// `<root>/machines/<host_id>`
    pub fn machine_dir(&self) -> String {
        let root = if self.root == "/" { "" } else { &self.root };
        format!("{root}/machines/{}", segment(&self.host_id))
    }

    /// Key of the host presence record.
    pub fn machine_key(&self) -> String {
        format!("{}/awsinfo", self.machine_dir())
    }

    /// Key of a container record.
    pub fn container_key(&self, id: &ContainerId) -> String {
        format!("{}/containers/{}", self.machine_dir(), segment(id.as_str()))
    }
}

fn segment(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_key_layout() {
        let layout = KeyLayout::new("/docker", "ec2-1-2-3-4.compute.amazonaws.com");
        assert_eq!(
            layout.machine_key(),
            "/docker/machines/ec2-1-2-3-4.compute.amazonaws.com/awsinfo"
        );
    }

    #[test]
    fn container_key_layout() {
        let layout = KeyLayout::new("/docker", "host-a");
        let id = ContainerId::new("4f9e");
        assert_eq!(
            layout.container_key(&id),
            "/docker/machines/host-a/containers/4f9e"
        );
    }

    #[test]
    fn root_is_normalized() {
        assert_eq!(
            KeyLayout::new("docker/", "h").machine_key(),
            "/docker/machines/h/awsinfo"
        );
        assert_eq!(KeyLayout::new("/", "h").machine_key(), "/machines/h/awsinfo");
    }

    #[test]
    fn docker_host_style_id_is_one_segment() {
        let layout = KeyLayout::new("/docker", "tcp://10.0.0.5:2375");
        assert_eq!(layout.host_id(), "tcp://10.0.0.5:2375");

        let key = layout.machine_key();
        assert_eq!(key, "/docker/machines/tcp%3A%2F%2F10.0.0.5%3A2375/awsinfo");
        assert_eq!(key.split('/').count(), 5);
    }

    #[test]
    fn container_id_is_one_segment() {
        let layout = KeyLayout::new("/docker", "h");
        assert_eq!(
            layout.container_key(&ContainerId::new("a/b")),
            "/docker/machines/h/containers/a%2Fb"
        );
    }

    #[test]
    fn keys_are_deterministic() {
        let a = KeyLayout::new("/docker", "h");
        let b = KeyLayout::new("/docker", "h");
        let id = ContainerId::new("c1");
        assert_eq!(a.container_key(&id), b.container_key(&id));
    }
}
