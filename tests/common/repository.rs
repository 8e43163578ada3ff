use crate::common::redirect_temp_dir;
use assert_fs::TempDir;
use bit_batch::areas::database::Database;
use bit_batch::areas::refs::{ExpectedOld, RefUpdate, RefUpdateResult};
use bit_batch::areas::repository::Repository;
use bit_batch::artifacts::branch::ref_name::RefName;
use bit_batch::artifacts::objects::blob::Blob;
use bit_batch::artifacts::objects::commit::{Author, Commit};
use bit_batch::artifacts::objects::entry_mode::{EntryMode, FileMode};
use bit_batch::artifacts::objects::object_id::ObjectId;
use bit_batch::artifacts::objects::tree::{Tree, TreeEntry};
use chrono::DateTime;
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use rstest::fixture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_COMMIT_TIME: AtomicI64 = AtomicI64::new(1_700_000_000);

#[fixture]
pub fn repository() -> (TempDir, Repository) {
    redirect_temp_dir();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repository = Repository::init(&dir.path().join("app.git"), "app").expect("Failed to init repository");
    (dir, repository)
}

/// A developer identity with a commit time later than every earlier one
pub fn developer() -> Author {
    let seconds = NEXT_COMMIT_TIME.fetch_add(60, Ordering::SeqCst);
    let timestamp = DateTime::parse_from_str(&format!("{seconds} +0000"), "%s %z").unwrap();
    Author::new_with_timestamp(Name().fake(), SafeEmail().fake(), timestamp)
}

/// Write a commit whose tree holds exactly `files`
pub fn commit_files(
    repository: &Repository,
    parents: &[ObjectId],
    files: &[(&str, &str)],
    message: &str,
) -> ObjectId {
    let files = files
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect::<Vec<_>>();
    let tree = write_tree(repository.database(), &files);
    let author = developer();

    repository
        .write_commit(&Commit::new(
            parents.to_vec(),
            tree,
            author.clone(),
            author,
            message.to_string(),
        ))
        .expect("Failed to write commit")
}

fn write_tree(database: &Database, files: &[(String, String)]) -> ObjectId {
    let mut tree = Tree::default();
    let mut directories: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

    for (path, content) in files {
        match path.split_once('/') {
            Some((directory, rest)) => directories
                .entry(directory.to_string())
                .or_default()
                .push((rest.to_string(), content.clone())),
            None => {
                let oid = database.store(&Blob::new(content.clone())).unwrap();
                tree.insert(path.clone(), TreeEntry::new(oid, EntryMode::File(FileMode::Regular)));
            }
        }
    }

    for (directory, entries) in directories {
        let oid = write_tree(database, &entries);
        tree.insert(directory, TreeEntry::new(oid, EntryMode::Directory));
    }

    database.store(&tree).unwrap()
}

/// Content of `path` in the tree of `commit`
pub fn read_file(repository: &Repository, commit: &ObjectId, path: &str) -> Option<String> {
    let commit = repository.load_commit(commit).unwrap();
    let mut tree = repository.database().parse_object_as_tree(commit.tree_oid()).unwrap();
    let mut segments = path.split('/').peekable();

    while let Some(segment) = segments.next() {
        let entry = tree.get(segment)?.clone();
        if segments.peek().is_none() {
            let blob = repository.database().parse_object_as_blob(&entry.oid).unwrap();
            return blob.as_text().map(str::to_string);
        }
        tree = repository.database().parse_object_as_tree(&entry.oid).unwrap();
    }

    None
}

pub fn set_branch(repository: &Repository, branch: &str, oid: &ObjectId) {
    let update = RefUpdate::new(
        RefName::branch(branch).unwrap(),
        ExpectedOld::Any,
        Some(oid.clone()),
        true,
    );
    let result = repository.update_ref(&update).result;
    assert!(
        matches!(
            result,
            RefUpdateResult::New | RefUpdateResult::FastForward | RefUpdateResult::Forced | RefUpdateResult::NoChange
        ),
        "unexpected {result}"
    );
}

pub fn branch_tip(repository: &Repository, branch: &str) -> Option<ObjectId> {
    repository.read_ref(&RefName::branch(branch).unwrap()).unwrap()
}
