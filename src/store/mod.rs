mod conversations;
mod readings;

pub use conversations::ConversationStore;
pub use readings::ReadingStore;
