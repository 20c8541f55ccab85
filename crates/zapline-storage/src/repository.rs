//! Repository layer for data access

pub mod api_keys;
pub mod campaign_recipients;
pub mod campaigns;
pub mod channels;
pub mod contacts;
pub mod conversations;
pub mod drip_enrollments;
pub mod drip_sequences;
pub mod messages;

pub use api_keys::ApiKeyRepository;
pub use campaign_recipients::CampaignRecipientRepository;
pub use campaigns::CampaignRepository;
pub use channels::ChannelRepository;
pub use contacts::ContactRepository;
pub use conversations::ConversationRepository;
pub use drip_enrollments::DripEnrollmentRepository;
pub use drip_sequences::DripSequenceRepository;
pub use messages::MessageRepository;
