//! Count-driven decorations for the next publication.
//!
//! Both rules look only at how many publications the history holds before
//! the post being decided about is recorded. They ignore which archetype is
//! due, so they apply equally to rotation days and content-plan days.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Call-to-action lines appended to promotional posts.
pub const CTA_POOL: &[&str] = &[
    "💡 Need this set up for your store? Leave a request → https://t.me/smart_analytics_mp_bot",
    "📊 Want the same results? Leave a request → https://t.me/smart_analytics_mp_bot",
    "💬 Questions? Message the bot → https://t.me/smart_analytics_mp_bot",
    "📲 Leave a request → https://t.me/smart_analytics_mp_bot",
];

/// Every third publication goes out without a call-to-action.
pub const CTA_SKIP_EVERY: usize = 3;

/// Every fourth publication carries a personal-experience anecdote.
pub const PERSONAL_EXPERIENCE_EVERY: usize = 4;

/// Advisory flags handed to content generation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Decorations {
    /// Call-to-action text, `None` when this publication omits it.
    pub call_to_action: Option<String>,
    pub personal_experience: bool,
}

impl Decorations {
    pub fn has_call_to_action(&self) -> bool {
        self.call_to_action.is_some()
    }
}

pub fn should_add_cta(publication_count: usize) -> bool {
    let position = publication_count % CTA_SKIP_EVERY + 1;
    position != CTA_SKIP_EVERY
}

pub fn should_add_personal_experience(publication_count: usize) -> bool {
    let position = publication_count % PERSONAL_EXPERIENCE_EVERY + 1;
    position == PERSONAL_EXPERIENCE_EVERY
}

pub fn choose_cta<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    CTA_POOL.choose(rng).copied().unwrap_or(CTA_POOL[0])
}

/// Decide both decorations for the publication following `publication_count`
/// earlier ones.
pub fn decorate<R: Rng + ?Sized>(publication_count: usize, rng: &mut R) -> Decorations {
    let call_to_action = should_add_cta(publication_count).then(|| choose_cta(rng).to_string());
    Decorations {
        call_to_action,
        personal_experience: should_add_personal_experience(publication_count),
    }
}
