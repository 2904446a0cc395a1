//! `postline-channels` — the outside world as seen by the publication
//! pipeline.
//!
//! # Architecture
//!
//! ```text
//! SourceCollector  ← CompositeCollector
//!                      ├─ ExaCollector  (POST /search)
//!                      └─ HabrCollector (GET /ru/search/, HTML)
//! Generator        ← AnthropicGenerator (POST /v1/messages)
//! Publisher        ← TelegramPublisher  (sendMessage, sendPoll)
//! OperatorNotifier ← TelegramPublisher  (admin chat)
//! ```
//!
//! The engine only sees the traits; tests substitute in-memory fakes.

pub mod anthropic;
pub mod composite;
pub mod error;
pub mod exa;
pub mod habr;
pub mod telegram;
pub mod traits;
pub mod types;

pub use anthropic::AnthropicGenerator;
pub use composite::CompositeCollector;
pub use error::ChannelError;
pub use exa::ExaCollector;
pub use habr::HabrCollector;
pub use telegram::TelegramPublisher;
pub use traits::{Generator, OperatorNotifier, Publisher, SourceCollector};
pub use types::{
    GeneratedPost, GenerationRequest, PollPublished, Published, Source, TopicOverride,
};
