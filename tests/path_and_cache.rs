//! Exercises `Path` glob matching together with `DirCache` invalidation the
//! way `FileSystem::glob`/`FileSystem::mv` compose them, without requiring a
//! live REST endpoint.

use adls_rs::dircache::{DirCache, DirEntry, EntryKind};
use adls_rs::path::Path;

fn file(name: &str) -> DirEntry {
    DirEntry {
        name: name.to_string(),
        kind: EntryKind::File,
        length: 0,
        permission: "770".to_string(),
        owner: "me".to_string(),
        group: "me".to_string(),
        modification_time: 0,
        replication: None,
        block_size: None,
    }
}

#[test]
fn glob_prefix_and_match_agree_on_a_populated_listing() {
    let cache = DirCache::new();
    let dir = Path::new("/data/logs");
    cache.put(&dir, vec![file("a.csv"), file("b.csv"), file("notes.txt")]);

    let pattern = Path::new("/data/logs/*.csv");
    assert_eq!(pattern.globless_prefix(), dir.trim());

    let listing = cache.get(&dir).unwrap();
    let matched: Vec<&str> = listing
        .iter()
        .filter(|e| dir.join(&e.name).matches(&pattern))
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(matched, vec!["a.csv", "b.csv"]);
}

#[test]
fn renaming_a_file_invalidates_both_the_old_and_new_parent_listings() {
    let cache = DirCache::new();
    cache.put(&Path::new("/a"), vec![file("x.txt")]);
    cache.put(&Path::new("/b"), vec![]);

    // Emulates FileSystem::mv's cache invalidation: the source subtree and
    // the destination's parent both drop their cached listing.
    cache.invalidate_subtree(&Path::new("/a/x.txt"));
    cache.invalidate(&Path::new("/b/x.txt"));

    assert!(cache.get(&Path::new("/a")).is_none());
    assert!(cache.get(&Path::new("/b")).is_none());
}
