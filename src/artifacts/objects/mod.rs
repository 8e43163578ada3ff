//! Git object types
//!
//! - **Blob**: file content, and the serialized form of batch records
//! - **Tree**: directory listing (names, modes and object ids)
//! - **Commit**: snapshot with parents, author, committer and message
//!
//! All objects share the loose object format `<type> <size>\0<content>`.

pub mod blob;
pub mod commit;
pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;
