//! Art modal state: one in-flight image request, no retries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::ai::GeneratedImage;

#[derive(Debug)]
pub enum ArtState {
    Loading,
    Ready(GeneratedImage),
    Failed(String),
}

/// Shown while the image request is loading, advanced on the animation tick.
pub const LOADING_PHRASES: [&str; 4] = [
    "Mixing digital colors...",
    "Sketching the composition...",
    "Adjusting lighting and shadows...",
    "Applying final artistic touches...",
];

/// Outcome of the image request task, tagged with the request id it was
/// issued under.
#[derive(Debug)]
pub enum ArtEvent {
    Ready {
        request_id: u64,
        image: GeneratedImage,
    },
    Failed {
        request_id: u64,
        message: String,
    },
}

/// The open modal. `request_id` is the liveness token: a result event whose
/// id does not match the currently open modal is stale and must be dropped.
#[derive(Debug)]
pub struct ArtModal {
    pub topic: String,
    pub request_id: u64,
    pub state: ArtState,
    pub saved_to: Option<PathBuf>,
}

impl ArtModal {
    pub fn new(topic: String, request_id: u64) -> Self {
        Self {
            topic,
            request_id,
            state: ArtState::Loading,
            saved_to: None,
        }
    }

    /// Write the ready image into `dir`. No-op error when still loading or
    /// failed.
    pub fn save_to(&mut self, dir: &Path) -> Result<PathBuf> {
        let ArtState::Ready(image) = &self.state else {
            anyhow::bail!("no image to save");
        };
        fs::create_dir_all(dir)?;
        let path = dir.join(download_file_name(&self.topic));
        fs::write(&path, &image.bytes)?;
        self.saved_to = Some(path.clone());
        Ok(path)
    }
}

/// Download name: whitespace runs become underscores, fixed suffix.
pub fn download_file_name(topic: &str) -> String {
    let slug: Vec<&str> = topic.split_whitespace().collect();
    format!("{}_AI_Art.jpg", slug.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: vec![0xff, 0xd8, 0xff],
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn file_name_from_single_word_topic() {
        assert_eq!(download_file_name("Volcanoes"), "Volcanoes_AI_Art.jpg");
    }

    #[test]
    fn file_name_collapses_whitespace() {
        assert_eq!(
            download_file_name("the  solar\tsystem"),
            "the_solar_system_AI_Art.jpg"
        );
    }

    #[test]
    fn save_writes_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut modal = ArtModal::new("Volcanoes".to_string(), 1);
        modal.state = ArtState::Ready(image());

        let path = modal.save_to(dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "Volcanoes_AI_Art.jpg");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0xd8, 0xff]);
        assert_eq!(modal.saved_to.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn save_refuses_while_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut modal = ArtModal::new("Volcanoes".to_string(), 1);
        assert!(modal.save_to(dir.path()).is_err());
    }
}
