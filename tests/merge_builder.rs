use assert_fs::TempDir;
use bit_batch::areas::repository::Repository;
use bit_batch::artifacts::branch::ref_name::RefName;
use bit_batch::artifacts::merge::merge_branch::MergeBranch;
use bit_batch::artifacts::merge::merge_builder::MergeBuilder;
use bit_batch::artifacts::merge::strategy::{FastForwardMode, MergeStrategy};
use bit_batch::artifacts::objects::object_id::ObjectId;
use bit_batch::errors::BatchError;
use common::repository::{commit_files, developer, read_file, repository, set_branch};
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

fn builder(repository: &Repository, strategy: MergeStrategy, ff_mode: FastForwardMode) -> MergeBuilder<'_> {
    MergeBuilder::new(repository, strategy, ff_mode, developer(), developer())
}

/// base with `lines`, then one commit per side replacing it
fn diverged(repository: &Repository, ours: &str, theirs: &str) -> (ObjectId, ObjectId, ObjectId) {
    let base = commit_files(repository, &[], &[("f.txt", "1\n2\n3\n4\n5\n")], "base");
    let ours = commit_files(repository, &[base.clone()], &[("f.txt", ours)], "ours");
    let theirs = commit_files(repository, &[base.clone()], &[("f.txt", theirs)], "theirs");
    (base, ours, theirs)
}

#[rstest]
fn merging_an_ancestor_keeps_the_tip(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let first = commit_files(&repository, &[], &[("a", "a\n")], "first");
    let second = commit_files(&repository, &[first.clone()], &[("a", "b\n")], "second");

    for ff_mode in [FastForwardMode::Ff, FastForwardMode::NoFf, FastForwardMode::FfOnly] {
        let merge = builder(&repository, MergeStrategy::Resolve, ff_mode);
        assert_eq!(merge.merge(&second, &first).unwrap(), second);
        assert_eq!(merge.merge(&second, &second).unwrap(), second);
    }
}

#[rstest]
fn descendants_fast_forward_unless_no_ff(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let base = commit_files(&repository, &[], &[("a", "a\n")], "base");
    let next = commit_files(&repository, &[base.clone()], &[("a", "a\n"), ("b", "b\n")], "add b");

    let ff = builder(&repository, MergeStrategy::Resolve, FastForwardMode::Ff);
    assert_eq!(ff.merge(&base, &next).unwrap(), next);
    let ff_only = builder(&repository, MergeStrategy::Resolve, FastForwardMode::FfOnly);
    assert_eq!(ff_only.merge(&base, &next).unwrap(), next);

    let no_ff = builder(&repository, MergeStrategy::Resolve, FastForwardMode::NoFf);
    let merge = no_ff.merge(&base, &next).unwrap();
    let commit = repository.load_commit(&merge).unwrap();
    assert_eq!(commit.parents(), &[base, next.clone()]);
    assert_eq!(commit.short_message(), "Merge \"add b\"");
    assert_eq!(commit.tree_oid(), repository.load_commit(&next).unwrap().tree_oid());
}

#[rstest]
fn ff_only_aborts_on_diverged_history(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let (_, ours, theirs) = diverged(&repository, "one\n2\n3\n4\n5\n", "1\n2\n3\n4\nfive\n");

    let err = builder(&repository, MergeStrategy::Resolve, FastForwardMode::FfOnly)
        .merge(&ours, &theirs)
        .unwrap_err();

    assert!(matches!(err, BatchError::MergeAborted));
}

#[rstest]
fn content_merge_combines_edits_that_path_merge_rejects(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let (_, ours, theirs) = diverged(&repository, "one\n2\n3\n4\n5\n", "1\n2\n3\n4\nfive\n");

    let resolved = builder(&repository, MergeStrategy::Resolve, FastForwardMode::Ff)
        .merge(&ours, &theirs)
        .unwrap();
    assert_eq!(
        read_file(&repository, &resolved, "f.txt").as_deref(),
        Some("one\n2\n3\n4\nfive\n")
    );
    assert_eq!(repository.load_commit(&resolved).unwrap().parents(), &[ours.clone(), theirs.clone()]);

    let err = builder(&repository, MergeStrategy::SimpleTwoWayInCore, FastForwardMode::Ff)
        .merge(&ours, &theirs)
        .unwrap_err();
    assert!(matches!(err, BatchError::MergeConflict { paths } if paths == vec!["f.txt".to_string()]));
}

#[rstest]
#[case::ours(MergeStrategy::Ours, "left\n")]
#[case::theirs(MergeStrategy::Theirs, "right\n")]
fn side_strategies_never_conflict(
    repository: (TempDir, Repository),
    #[case] strategy: MergeStrategy,
    #[case] expected: &str,
) {
    let (_dir, repository) = repository;
    let (_, ours, theirs) = diverged(&repository, "left\n", "right\n");

    let merge = builder(&repository, strategy, FastForwardMode::Ff)
        .merge(&ours, &theirs)
        .unwrap();

    assert_eq!(read_file(&repository, &merge, "f.txt").as_deref(), Some(expected));
    assert_eq!(repository.load_commit(&merge).unwrap().parents().len(), 2);
}

#[rstest]
fn unrelated_histories_merge_disjoint_paths(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let ours = commit_files(&repository, &[], &[("src/lib.rs", "lib\n")], "library");
    let theirs = commit_files(&repository, &[], &[("docs/guide.md", "guide\n")], "docs");

    let merge = builder(&repository, MergeStrategy::Resolve, FastForwardMode::Ff)
        .merge(&ours, &theirs)
        .unwrap();

    assert_eq!(read_file(&repository, &merge, "src/lib.rs").as_deref(), Some("lib\n"));
    assert_eq!(read_file(&repository, &merge, "docs/guide.md").as_deref(), Some("guide\n"));
}

#[rstest]
fn merge_commits_carry_the_given_identities_and_message(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let (_, ours, theirs) = diverged(&repository, "one\n2\n3\n4\n5\n", "1\n2\n3\n4\nfive\n");
    let author = developer();
    let committer = developer();

    let merge = MergeBuilder::new(
        &repository,
        MergeStrategy::Resolve,
        FastForwardMode::Ff,
        author.clone(),
        committer.clone(),
    )
    .with_message(Some("Batch merge".to_string()))
    .merge(&ours, &theirs)
    .unwrap();

    let commit = repository.load_commit(&merge).unwrap();
    assert_eq!(commit.message().trim_end(), "Batch merge");
    assert_eq!(commit.author().name(), author.name());
    assert_eq!(commit.author().email(), author.email());
    assert_eq!(commit.committer().name(), committer.name());
    assert_eq!(commit.committer().timestamp(), committer.timestamp());
}

fn merge_branch<'r>(
    repository: &'r Repository,
    expected_tip: Option<ObjectId>,
    source: &str,
) -> MergeBranch<'r> {
    MergeBranch {
        repository,
        destination: RefName::branch("main").unwrap(),
        expected_tip,
        source: source.to_string(),
        strategy: MergeStrategy::Resolve,
        ff_mode: FastForwardMode::Ff,
        message: None,
        author: developer(),
        committer: developer(),
    }
}

#[rstest]
fn merge_branch_reads_the_destination_without_moving_it(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let (base, ours, theirs) = diverged(&repository, "one\n2\n3\n4\n5\n", "1\n2\n3\n4\nfive\n");
    set_branch(&repository, "main", &base);
    set_branch(&repository, "feature", &theirs);

    let fast_forward = merge_branch(&repository, None, "feature").call().unwrap();
    assert_eq!(fast_forward, theirs);

    let merged = merge_branch(&repository, Some(ours.clone()), &theirs.to_string())
        .call()
        .unwrap();
    assert_eq!(repository.load_commit(&merged).unwrap().parents(), &[ours, theirs.clone()]);

    let ancestor = merge_branch(&repository, None, "feature~1").call().unwrap();
    assert_eq!(ancestor, base.clone());

    assert_eq!(
        repository.read_ref(&RefName::branch("main").unwrap()).unwrap(),
        Some(base)
    );
}

#[rstest]
fn merge_branch_reports_missing_refs_and_revisions(repository: (TempDir, Repository)) {
    let (_dir, repository) = repository;
    let root = commit_files(&repository, &[], &[("a", "a\n")], "root");

    assert!(matches!(
        merge_branch(&repository, None, &root.to_string()).call(),
        Err(BatchError::NoSuchRef { .. })
    ));
    assert!(matches!(
        merge_branch(&repository, Some(root.clone()), &root.to_string()).call(),
        Err(BatchError::NoSuchRef { name }) if name == "refs/heads/main"
    ));

    set_branch(&repository, "main", &root);
    assert!(matches!(
        merge_branch(&repository, None, "no-such-branch").call(),
        Err(BatchError::InvalidRevision { revision }) if revision == "no-such-branch"
    ));
}
