use crate::areas::repository::Repository;
use crate::artifacts::branch::{ANCESTOR_REGEX, INVALID_REF_NAME_REGEX, PARENT_REGEX, REF_ALIASES};
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;

/// Minimum length of an abbreviated object id
const MIN_ABBREVIATED_OID_LENGTH: usize = 4;

/// A revision expression naming a commit
///
/// Supported forms:
/// - ref names: `main`, `refs/heads/main`, `refs/changes/07/7/2`, `HEAD` (alias `@`)
/// - full or abbreviated object ids, tried when no ref of that name exists
/// - `<rev>^` for the first parent and `<rev>~<n>` for the n-th first-parent ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Ref(String),
    Parent(Box<Revision>),
    Ancestor(Box<Revision>, usize),
}

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        let parent_regex = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        let ancestor_regex = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;

        if let Some(caps) = parent_regex.captures(revision) {
            return Ok(Revision::Parent(Box::new(Self::try_parse(&caps[1])?)));
        }

        if let Some(caps) = ancestor_regex.captures(revision) {
            let generations = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            return Ok(Revision::Ancestor(
                Box::new(Self::try_parse(&caps[1])?),
                generations,
            ));
        }

        let name = *REF_ALIASES.get(revision).unwrap_or(&revision);
        let invalid_name_regex = regex::Regex::new(INVALID_REF_NAME_REGEX)
            .with_context(|| format!("invalid ref name regex: {INVALID_REF_NAME_REGEX}"))?;
        if name.is_empty() || invalid_name_regex.is_match(name) {
            anyhow::bail!("invalid revision: {revision}");
        }

        Ok(Revision::Ref(name.to_string()))
    }

    /// Resolve to a commit id
    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => Self::resolve_name(name, repository),
            Revision::Parent(base) => Self::first_parent(&base.resolve(repository)?, repository),
            Revision::Ancestor(base, generations) => {
                let mut oid = base.resolve(repository)?;
                for _ in 0..*generations {
                    oid = Self::first_parent(&oid, repository)?;
                }
                Ok(oid)
            }
        }
    }

    fn resolve_name(name: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        if let Some((_, oid)) = repository.refs().find_ref(name)? {
            return Ok(oid);
        }

        if Self::looks_like_oid(name) {
            return Self::resolve_oid(name, repository);
        }

        anyhow::bail!("unknown revision {name}")
    }

    fn first_parent(oid: &ObjectId, repository: &Repository) -> anyhow::Result<ObjectId> {
        let commit = repository.database().parse_object_as_commit(oid)?;
        commit
            .parents()
            .first()
            .cloned()
            .with_context(|| format!("commit {} has no parent", oid.to_short_oid()))
    }

    fn resolve_oid(prefix: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        let database = repository.database();

        if prefix.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(prefix.to_string())?;
            Self::ensure_commit(&oid, repository)?;
            return Ok(oid);
        }

        let candidates = database
            .find_objects_by_prefix(prefix)?
            .into_iter()
            .filter(|oid| {
                database
                    .get_object_type(oid)
                    .is_ok_and(|object_type| object_type == ObjectType::Commit)
            })
            .collect::<Vec<_>>();

        match candidates.as_slice() {
            [] => anyhow::bail!("unknown revision {prefix}"),
            [oid] => Ok(oid.clone()),
            _ => {
                let listed = candidates
                    .iter()
                    .map(ObjectId::to_short_oid)
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::bail!("short object id {prefix} is ambiguous: {listed}")
            }
        }
    }

    fn ensure_commit(oid: &ObjectId, repository: &Repository) -> anyhow::Result<()> {
        let object_type = repository
            .database()
            .get_object_type(oid)
            .with_context(|| format!("object {} not found", oid))?;

        if object_type != ObjectType::Commit {
            anyhow::bail!("object {} is a {}, not a commit", oid.to_short_oid(), object_type);
        }

        Ok(())
    }

    fn looks_like_oid(name: &str) -> bool {
        (MIN_ABBREVIATED_OID_LENGTH..=OBJECT_ID_LENGTH).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_hexdigit())
    }
}
