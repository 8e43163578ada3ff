//! Ref names and revision expressions

pub mod ref_name;
pub mod revision;

pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\/\/|\.lock$|\.lock\/|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";
pub const PARENT_REGEX: &str = r"^(.+)\^$";
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};

/// Directories searched, in order, when resolving a short ref name
pub const REF_SEARCH_PATHS: [&str; 4] = ["", "refs/", "refs/tags/", "refs/heads/"];

pub const HEADS_PREFIX: &str = "refs/heads/";
