//! Photo descriptions and voice transcriptions for ingest.
//!
//! Any failure here only costs detail: the message is stored with the generic
//! attachment tag instead.

use anyhow::{Result, anyhow};
use tracing::warn;

use teammate_engine::ingest::MediaDescriptions;
use teammate_types::telegram::{Message, PhotoSize};

use crate::state::AppStateInner;

/// Photos are fetched at about this size; bigger adds cost, not detail.
const TARGET_PHOTO_SIDE: u32 = 768;

const PHOTO_INSTRUCTION: &str =
    "Describe this image in one short paragraph for someone who cannot see it. Mention any visible text.";
const VOICE_INSTRUCTION: &str =
    "Transcribe this voice message verbatim in its original language. Reply with the transcription only.";

pub async fn describe_media(state: &AppStateInner, message: &Message) -> MediaDescriptions {
    let mut media = MediaDescriptions::default();
    if !state.describe_media {
        return media;
    }

    if let Some(photo) = message.photo.as_deref().and_then(best_photo_size) {
        match describe_file(state, &photo.file_id, "image/jpeg", PHOTO_INSTRUCTION).await {
            Ok(description) => media.photo = Some(description),
            Err(e) => warn!("Photo description failed for message {}: {}", message.message_id, e),
        }
    }

    if let Some(voice) = &message.voice {
        let mime_type = voice.mime_type.as_deref().unwrap_or("audio/ogg");
        match describe_file(state, &voice.file_id, mime_type, VOICE_INSTRUCTION).await {
            Ok(transcript) => media.voice = Some(transcript),
            Err(e) => warn!("Voice transcription failed for message {}: {}", message.message_id, e),
        }
    }

    media
}

async fn describe_file(state: &AppStateInner, file_id: &str, mime_type: &str, instruction: &str) -> Result<String> {
    let file = state.telegram.get_file(file_id).await?;
    let path = file
        .file_path
        .ok_or_else(|| anyhow!("file {} has no download path", file.file_id))?;
    let bytes = state.telegram.download_file(&path).await?;

    let text = state.ai.describe(instruction, mime_type, &bytes).await?;
    Ok(text.trim().to_string())
}

/// Largest size that fits [`TARGET_PHOTO_SIDE`], or the smallest one if none fits.
pub fn best_photo_size(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    let longest_side = |p: &PhotoSize| p.width.max(p.height);

    sizes
        .iter()
        .filter(|p| longest_side(*p) <= TARGET_PHOTO_SIDE)
        .max_by_key(|p| longest_side(*p))
        .or_else(|| sizes.iter().min_by_key(|p| longest_side(*p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(file_id: &str, width: u32, height: u32) -> PhotoSize {
        PhotoSize {
            file_id: file_id.into(),
            width,
            height,
        }
    }

    #[test]
    fn picks_largest_size_within_target() {
        let sizes = vec![size("s", 90, 60), size("m", 320, 240), size("l", 800, 600), size("xl", 1280, 960)];
        assert_eq!(best_photo_size(&sizes).unwrap().file_id, "m");
    }

    #[test]
    fn falls_back_to_smallest_when_all_are_big() {
        let sizes = vec![size("xl", 2560, 1920), size("l", 1280, 960)];
        assert_eq!(best_photo_size(&sizes).unwrap().file_id, "l");
    }

    #[test]
    fn no_sizes_no_photo() {
        assert!(best_photo_size(&[]).is_none());
    }
}
