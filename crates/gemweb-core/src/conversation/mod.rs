//! Conversation cache primitives
//!
//! Everything needed to recognize an incoming message list as a
//! continuation of a stored session: canonical message forms, deterministic
//! prefix hashes, prompt assembly, lookup over the in-memory keyspaces, and
//! the durable store backing them.

pub mod hashing;
pub mod lookup;
pub mod message;
pub mod prompt;
pub mod store;


pub use hashing::{
    account_meta_key, hash_conversation, hash_conversation_for_account, sha256_hex,
};
pub use lookup::{
    build_lookup_hashes, build_storage_hashes, find_conversation_in, find_conversation_key,
    find_reusable_session_in, find_reusable_session_key, PrefixHash,
};
pub use message::{
    equal_messages, normalize_role, remove_think_tags, sanitize_assistant_messages,
    stored_to_messages, to_stored_messages, ConversationRecord, Message, StoredMessage,
};
pub use prompt::{add_role_tag, append_xml_wrap_hint_if_needed, build_prompt, need_role_tags};
pub use store::{conv_db_path, load_data, load_store, save_data, save_store};
