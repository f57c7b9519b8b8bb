use serde::Serialize;
use uuid::Uuid;

use super::event::GroupId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptItem {
    pub id: Uuid,
    pub group_id: GroupId,
    pub text: String,
    /// Still receiving text.
    pub open: bool,
}

/// Input transcription, grouped into units.
///
/// Text is appended to the open unit; forced splits keep it open so one long
/// utterance reads as one item. A natural end of phrase or a final-for-turn
/// text closes it.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    items: Vec<TranscriptItem>,
    open: Option<Uuid>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, group_id: GroupId, text: &str) {
        if let Some(open_id) = self.open {
            if let Some(last) = self.items.last_mut() {
                if last.id == open_id {
                    last.text.push_str(text);
                    return;
                }
            }
        }

        let id = Uuid::new_v4();
        self.items.push(TranscriptItem {
            id,
            group_id,
            text: text.to_string(),
            open: true,
        });
        self.open = Some(id);
    }

    pub fn close_unit(&mut self) {
        if let Some(open_id) = self.open.take() {
            if let Some(item) = self.items.iter_mut().rev().find(|i| i.id == open_id) {
                item.open = false;
            }
        }
    }

    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.open = None;
    }
}
