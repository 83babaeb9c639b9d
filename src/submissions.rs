use std::collections::HashMap;

use crate::error::SessionError;
use crate::types::{PlayerId, SubmissionView};

const MAX_CAPTION_CHARS: usize = 100;
const MAX_TEMPLATE_CHARS: usize = 512;

/// A player's captioned meme for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub player_id: PlayerId,
    pub template: String,
    pub top_text: String,
    pub bottom_text: String,
    /// Position in submission order. Lower means earlier.
    pub order: u64,
}

impl Submission {
    pub fn view(&self) -> SubmissionView {
        SubmissionView {
            player_id: self.player_id,
            template: self.template.clone(),
            top_text: self.top_text.clone(),
            bottom_text: self.bottom_text.clone(),
        }
    }
}

/// Trimmed captions, or `InvalidCaption` if both are empty or either is too long.
fn validate_captions(top_text: &str, bottom_text: &str) -> Result<(String, String), SessionError> {
    let (top, bottom) = (top_text.trim(), bottom_text.trim());
    if top.is_empty() && bottom.is_empty() {
        return Err(SessionError::InvalidCaption);
    }
    if top.chars().count() > MAX_CAPTION_CHARS || bottom.chars().count() > MAX_CAPTION_CHARS {
        return Err(SessionError::InvalidCaption);
    }
    Ok((top.to_string(), bottom.to_string()))
}

fn validate_template(template: &str) -> Result<String, SessionError> {
    let template = template.trim();
    if template.is_empty() || template.chars().count() > MAX_TEMPLATE_CHARS {
        return Err(SessionError::InvalidCaption);
    }
    Ok(template.to_string())
}

/// Holds at most one submission per player for a round.
#[derive(Debug, Clone, Default)]
pub struct SubmissionStore {
    submissions: HashMap<PlayerId, Submission>,
    next_order: u64,
    sealed: bool,
}

impl SubmissionStore {
    pub fn submit(
        &mut self,
        player_id: PlayerId,
        template: String,
        top_text: String,
        bottom_text: String,
    ) -> Result<(), SessionError> {
        if self.sealed {
            return Err(SessionError::PhaseMismatch);
        }
        if self.submissions.contains_key(&player_id) {
            return Err(SessionError::AlreadySubmitted);
        }
        let template = validate_template(&template)?;
        let (top_text, bottom_text) = validate_captions(&top_text, &bottom_text)?;
        let duplicate = self.submissions.values().any(|s| {
            s.template == template && s.top_text == top_text && s.bottom_text == bottom_text
        });
        if duplicate {
            return Err(SessionError::DuplicateMeme);
        }

        let order = self.next_order;
        self.next_order += 1;
        self.submissions.insert(
            player_id,
            Submission {
                player_id,
                template,
                top_text,
                bottom_text,
                order,
            },
        );
        Ok(())
    }

    /// Withdraws an unsealed submission, used when its owner leaves mid-creation.
    pub fn withdraw(&mut self, player_id: PlayerId) -> Option<Submission> {
        if self.sealed {
            return None;
        }
        self.submissions.remove(&player_id)
    }

    /// No further submissions or withdrawals after this.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Submission> {
        self.submissions.get(&player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.submissions.contains_key(&player_id)
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    /// Submissions in the order they arrived.
    pub fn in_order(&self) -> Vec<&Submission> {
        let mut all: Vec<&Submission> = self.submissions.values().collect();
        all.sort_by_key(|s| s.order);
        all
    }
}
