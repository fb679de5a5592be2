//! End-to-end tests of the resolution pipeline through the public API,
//! using in-memory definitions and XML-backed mime directories.

use mimey::MimeDatabase;

const BASE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<mime-info xmlns="http://www.freedesktop.org/standards/shared-mime-info">
  <mime-type type="application/x-zerosize"/>
  <mime-type type="text/plain">
    <comment>Plain text</comment>
    <glob pattern="*.txt"/>
  </mime-type>
  <mime-type type="text/html">
    <comment>HTML document</comment>
    <comment xml:lang="de">HTML-Dokument</comment>
    <sub-class-of type="text/plain"/>
    <alias type="application/x-html"/>
    <glob pattern="*.html"/>
    <glob pattern="*.htm"/>
    <magic priority="40">
      <match type="string" value="&lt;!DOCTYPE html" offset="0:16"/>
      <match type="string" value="&lt;html" offset="0:16"/>
    </magic>
  </mime-type>
  <mime-type type="image/png">
    <comment>PNG image</comment>
    <generic-icon name="image-x-generic"/>
    <glob pattern="*.png"/>
    <magic priority="50">
      <match type="string" value="\x89PNG" offset="0"/>
    </magic>
  </mime-type>
  <mime-type type="application/gzip">
    <glob pattern="*.gz"/>
  </mime-type>
  <mime-type type="application/x-compressed-tar">
    <sub-class-of type="application/gzip"/>
    <glob pattern="*.tar.gz"/>
  </mime-type>
</mime-info>
"#;

fn base_db() -> MimeDatabase {
    let db = MimeDatabase::with_cache_dirs(Vec::new());
    db.add_definition_data("base", BASE).unwrap();
    db
}

#[test]
fn test_mime_type_for_name() {
    let db = base_db();
    assert!(db.mime_type_for_name("text/html").is_valid());
    assert!(!db.mime_type_for_name("text/x-nothing").is_valid());
    // an alias lookup lands on the canonical type
    assert_eq!(db.mime_type_for_name("application/x-html").name(), "text/html");
    assert_eq!(
        db.mime_type_for_name("application/x-html"),
        db.mime_type_for_name("text/html")
    );
}

#[test]
fn test_file_name_matching() {
    let db = base_db();
    assert_eq!(db.mime_type_for_file_name("page.html"), ["text/html"]);
    assert_eq!(db.mime_type_for_file_name("PAGE.HTM"), ["text/html"]);
    assert_eq!(db.mime_type_for_file_name("shot.png"), ["image/png"]);
    assert!(db.mime_type_for_file_name("noext").is_empty());
}

#[test]
fn test_longer_suffix_wins() {
    let db = base_db();
    assert_eq!(
        db.mime_type_for_file_name("backup.tar.gz"),
        ["application/x-compressed-tar"]
    );
    assert_eq!(db.mime_type_for_file_name("data.gz"), ["application/gzip"]);
}

#[test]
fn test_suffix_for_file_name() {
    let db = base_db();
    assert_eq!(
        db.suffix_for_file_name("backup.tar.gz").as_deref(),
        Some("tar.gz")
    );
    assert_eq!(db.suffix_for_file_name("page.html").as_deref(), Some("html"));
    assert_eq!(db.suffix_for_file_name("noext"), None);
}

#[test]
fn test_content_matching() {
    let db = base_db();
    // a magic hit reports the rule's priority as its accuracy
    let (mime, accuracy) = db.mime_type_for_data(b"\x89PNG\r\n\x1a\n....");
    assert_eq!(mime.name(), "image/png");
    assert_eq!(accuracy, 50);
    let (mime, accuracy) = db.mime_type_for_data(b"<html><body>hi</body></html>");
    assert_eq!(mime.name(), "text/html");
    assert_eq!(accuracy, 40);
    // indented document, still within the offset range
    assert_eq!(
        db.mime_type_for_data(b"  <!DOCTYPE html>\n").0.name(),
        "text/html"
    );
}

#[test]
fn test_text_heuristic() {
    let db = base_db();
    let (mime, accuracy) = db.mime_type_for_data(b"just some words\n");
    assert_eq!(mime.name(), "text/plain");
    assert_eq!(accuracy, 5);
    // UTF-16 byte order marks count as text
    assert_eq!(
        db.mime_type_for_data(&[0xff, 0xfe, 0x68, 0x00]).0.name(),
        "text/plain"
    );
    // control characters mean binary
    let (mime, accuracy) = db.mime_type_for_data(b"\x00\x01\x02");
    assert!(mime.is_default());
    assert_eq!(accuracy, 0);
}

#[test]
fn test_zero_size_content() {
    let db = base_db();
    let (mime, accuracy) = db.mime_type_for_data(b"");
    assert_eq!(mime.name(), "application/x-zerosize");
    assert_eq!(accuracy, 100);
    // without a definition for it, empty content is just unknown
    let (mime, accuracy) = MimeDatabase::with_cache_dirs(Vec::new()).mime_type_for_data(b"");
    assert!(mime.is_default());
    assert_eq!(accuracy, 0);
}

#[test]
fn test_unique_glob_wins_over_content() {
    let db = base_db();
    // the name is unambiguous, so the contradicting content is ignored
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("shot.png", b"<html></html>");
    assert_eq!(mime.name(), "image/png");
    assert_eq!(accuracy, 100);
}

#[test]
fn test_magic_resolves_glob_conflict() {
    let db = base_db();
    db.add_definition_data(
        "conflict",
        br#"<mime-info>
  <mime-type type="application/x-word"><glob pattern="*.doc"/>
    <magic><match type="string" value="WORDDOC" offset="0"/></magic>
  </mime-type>
  <mime-type type="application/x-other-doc"><glob pattern="*.doc"/></mime-type>
</mime-info>"#,
    )
    .unwrap();
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("letter.doc", b"WORDDOC....");
    assert_eq!(mime.name(), "application/x-word");
    assert_eq!(accuracy, 100);
}

#[test]
fn test_inheritance_resolves_glob_conflict() {
    let db = base_db();
    db.add_definition_data(
        "spam",
        br#"<mime-info>
  <mime-type type="text/x-spam">
    <sub-class-of type="text/plain"/>
    <glob pattern="*.spam"/>
  </mime-type>
  <mime-type type="application/x-spam-binary"><glob pattern="*.spam"/></mime-type>
</mime-info>"#,
    )
    .unwrap();
    // content sniffs as text/plain; the candidate inheriting from it wins
    // over the lexicographically smaller one
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("mail.spam", b"hello there\n");
    assert_eq!(mime.name(), "text/x-spam");
    assert_eq!(accuracy, 100);
    // binary content decides nothing; smallest name breaks the tie at a
    // token accuracy
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("mail.spam", b"\x00\x01");
    assert_eq!(mime.name(), "application/x-spam-binary");
    assert_eq!(accuracy, 20);
}

#[test]
fn test_content_used_when_name_unknown() {
    let db = base_db();
    // no glob candidate; the magic hit comes back at its own accuracy
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("download.bin", b"\x89PNG\r\n\x1a\n");
    assert_eq!(mime.name(), "image/png");
    assert_eq!(accuracy, 50);
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("download.bin", b"\x00\x01");
    assert!(mime.is_default());
    assert_eq!(accuracy, 0);
}

#[test]
fn test_trailing_slash_is_directory() {
    let db = base_db();
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("some/dir/", b"");
    assert_eq!(mime.name(), "inode/directory");
    assert_eq!(accuracy, 100);
    // the name-only query honors the same rule
    assert_eq!(db.mime_type_for_file_name("some/dir/"), ["inode/directory"]);
}

#[test]
fn test_override_suppresses_globs_and_magic() {
    let db = base_db();
    db.add_definition_data(
        "override",
        br#"<mime-type type="image/png">
  <glob pattern="*.mypng"/>
  <magic><match type="string" value="MYPNG" offset="0"/></magic>
</mime-type>"#,
    )
    .unwrap();
    // the overriding definition replaces globs and magic entirely
    assert_eq!(db.mime_type_for_file_name("a.mypng"), ["image/png"]);
    assert!(db.mime_type_for_file_name("a.png").is_empty());
    assert_eq!(db.mime_type_for_data(b"MYPNG....").0.name(), "image/png");
    // the shadowed magic rule is gone; \x89 is not a control character, so
    // this payload falls through to the text heuristic
    assert_eq!(
        db.mime_type_for_data(b"\x89PNG but actually text").0.name(),
        "text/plain"
    );
    assert!(db.mime_type_for_data(b"\x89PNG\r\n\x1a\n").0.is_default());

    db.remove_definition_data("override");
    assert_eq!(db.mime_type_for_file_name("a.png"), ["image/png"]);
}

fn weighted_foo_db() -> MimeDatabase {
    let db = MimeDatabase::with_cache_dirs(Vec::new());
    db.add_definition_data(
        "older",
        br#"<mime-type type="app/heavy"><glob pattern="*.foo" weight="80"/></mime-type>"#,
    )
    .unwrap();
    db.add_definition_data(
        "newer",
        br#"<mime-type type="app/light"><glob pattern="*.foo"/></mime-type>"#,
    )
    .unwrap();
    db
}

#[test]
fn test_weight_beats_provider_order() {
    // different type names, so no shadowing; weight decides
    let db = weighted_foo_db();
    assert_eq!(db.mime_type_for_file_name("x.foo"), ["app/heavy"]);
}

#[test]
fn test_top_weight_winner_survives_content_miss() {
    // app/heavy alone sits at the top weight, so it wins outright even
    // though app/light also matches *.foo and the content sniffs nothing
    let db = weighted_foo_db();
    let (mime, accuracy) = db.mime_type_for_file_name_and_data("x.foo", b"\x00\x01\x02");
    assert_eq!(mime.name(), "app/heavy");
    assert_eq!(accuracy, 100);
}

#[test]
fn test_aliases() {
    let db = base_db();
    assert_eq!(db.aliases("text/html"), vec!["application/x-html"]);
    assert!(db.aliases("image/png").is_empty());
    // alias-resolved queries
    assert_eq!(db.parents("application/x-html"), vec!["text/plain"]);
    assert!(db.inherits("application/x-html", "text/plain"));
}

#[test]
fn test_ancestors_breadth_first() {
    let db = MimeDatabase::with_cache_dirs(Vec::new());
    db.add_definition_data(
        "tree",
        br#"<mime-info>
  <mime-type type="a/child">
    <sub-class-of type="a/p1"/>
    <sub-class-of type="a/p2"/>
  </mime-type>
  <mime-type type="a/p1"><sub-class-of type="a/gp"/></mime-type>
  <mime-type type="a/p2"/>
  <mime-type type="a/gp"/>
</mime-info>"#,
    )
    .unwrap();
    // both direct parents before the grandparent
    assert_eq!(db.ancestors("a/child"), vec!["a/p1", "a/p2", "a/gp"]);
    assert!(db.inherits("a/child", "a/gp"));
    assert!(db.inherits("a/child", "a/child"));
    assert!(!db.inherits("a/gp", "a/child"));
}

#[test]
fn test_inheritance_cycle_terminates() {
    let db = MimeDatabase::with_cache_dirs(Vec::new());
    db.add_definition_data(
        "cycle",
        br#"<mime-info>
  <mime-type type="a/x"><sub-class-of type="a/y"/></mime-type>
  <mime-type type="a/y"><sub-class-of type="a/x"/></mime-type>
</mime-info>"#,
    )
    .unwrap();
    assert!(db.inherits("a/x", "a/y"));
    assert!(db.inherits("a/y", "a/x"));
    assert!(!db.inherits("a/x", "a/z"));
    assert_eq!(db.ancestors("a/x"), vec!["a/y", "a/x"]);
}

#[test]
fn test_comments_with_locale_fallback() {
    let db = base_db();
    assert_eq!(db.comment("text/html", "de").as_deref(), Some("HTML-Dokument"));
    assert_eq!(db.comment("text/html", "de_AT").as_deref(), Some("HTML-Dokument"));
    assert_eq!(db.comment("text/html", "fr").as_deref(), Some("HTML document"));
    assert_eq!(db.comment("no/such", "en"), None);
}

#[test]
fn test_icon_names() {
    let db = base_db();
    // no explicit icon: conventional name with the slash dashed
    assert_eq!(db.icon_name("image/png").as_deref(), Some("image-png"));
    assert_eq!(db.icon_name("no/such"), None);
    // explicit generic icon, and the media fallback otherwise
    assert_eq!(
        db.generic_icon_name("image/png").as_deref(),
        Some("image-x-generic")
    );
    assert_eq!(
        db.generic_icon_name("text/html").as_deref(),
        Some("text-x-generic")
    );
}

#[test]
fn test_glob_pattern_enumeration() {
    let db = base_db();
    assert_eq!(db.glob_patterns("text/html"), vec!["*.html", "*.htm"]);
    assert!(db.glob_patterns("no/such").is_empty());
}

#[test]
fn test_all_mime_types() {
    let db = base_db();
    let names: Vec<String> = db
        .all_mime_types()
        .into_iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(names.len(), 6);
    assert!(names.contains(&"text/html".to_string()));
    assert!(names.contains(&"application/x-zerosize".to_string()));
}

#[test]
fn test_xml_directory_provider_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let packages = dir.path().join("packages");
    std::fs::create_dir_all(&packages).unwrap();
    std::fs::write(
        packages.join("aaa.xml"),
        r#"<mime-type type="app/from-dir"><glob pattern="*.fd"/></mime-type>"#,
    )
    .unwrap();

    let db = MimeDatabase::with_cache_dirs(vec![dir.path().to_path_buf()]);
    assert_eq!(db.mime_type_for_file_name("x.fd"), ["app/from-dir"]);
    assert!(db.mime_type_for_file_name("x.late").is_empty());

    // a file added later is only seen after an explicit reload
    std::fs::write(
        packages.join("bbb.xml"),
        r#"<mime-type type="app/late"><glob pattern="*.late"/></mime-type>"#,
    )
    .unwrap();
    db.reload();
    assert_eq!(db.mime_type_for_file_name("x.late"), ["app/late"]);
}

#[test]
fn test_definitions_shadow_directories() {
    let dir = tempfile::tempdir().unwrap();
    let packages = dir.path().join("packages");
    std::fs::create_dir_all(&packages).unwrap();
    std::fs::write(
        packages.join("dir.xml"),
        r#"<mime-type type="app/shared"><glob pattern="*.one"/></mime-type>"#,
    )
    .unwrap();

    let db = MimeDatabase::with_cache_dirs(vec![dir.path().to_path_buf()]);
    db.add_definition_data(
        "runtime",
        br#"<mime-type type="app/shared"><glob pattern="*.two"/></mime-type>"#,
    )
    .unwrap();
    assert_eq!(db.mime_type_for_file_name("f.two"), ["app/shared"]);
    assert!(db.mime_type_for_file_name("f.one").is_empty());
}

#[test]
fn test_concurrent_queries() {
    use std::sync::Arc;
    let db = Arc::new(base_db());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(db.mime_type_for_file_name("a.png"), ["image/png"]);
                    assert_eq!(
                        db.mime_type_for_data(b"\x89PNG\r\n\x1a\n").0.name(),
                        "image/png"
                    );
                    if i == 0 {
                        db.reload();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
