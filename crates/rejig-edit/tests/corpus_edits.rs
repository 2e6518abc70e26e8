//! Surgical edits over realistic files: the edit must touch exactly the
//! lines it addresses and nothing else.

use rejig_edit::{get, parse, set};
use similar::{ChangeTag, TextDiff};

const DERIVATION: &str = r#"{ lib, stdenv, fetchurl }:

stdenv.mkDerivation rec {
  pname = "demo";
  version = "2.1.0";

  src = fetchurl {
    url = "https://example.org/demo-${version}.tar.gz";
    sha256 = "0000000000000000000000000000000000000000000000000000";
  };

  meta = with lib; {
    description = "A demonstration package";
    license = licenses.mit;
  };
}
"#;

const CONFIGURATION: &str = r#"{ config, pkgs, ... }:

{
  boot.loader.systemd-boot.enable = true;

  networking.hostName = "mox"; # define your hostname

  system.stateVersion = "24.05";
}
"#;

/// Lines removed and added by an edit.
fn diff_counts(before: &str, after: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(before, after);
    let mut removed = 0;
    let mut added = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => removed += 1,
            ChangeTag::Insert => added += 1,
            ChangeTag::Equal => {}
        }
    }
    (removed, added)
}

#[test]
fn version_bump_touches_one_line() {
    let mut src = parse(DERIVATION).unwrap();
    let out = set(&mut src, "version", "\"2.2.0\"").unwrap();
    assert_eq!(diff_counts(DERIVATION, &out), (1, 1));
    assert!(out.contains("version = \"2.2.0\";"));
    // The interpolated url and the sha are untouched.
    assert!(out.contains("demo-${version}.tar.gz"));
    assert!(out.contains("sha256 = \"0000000000000000000000000000000000000000000000000000\";"));
}

#[test]
fn hostname_change_keeps_its_inline_comment_line_shape() {
    let mut src = parse(CONFIGURATION).unwrap();
    let out = set(&mut src, "networking.hostName", "\"vex\"").unwrap();
    assert_eq!(diff_counts(CONFIGURATION, &out), (1, 1));
    assert!(out.contains("networking.hostName = \"vex\";"));
    // The attrpath siblings keep their exact text.
    assert!(out.contains("boot.loader.systemd-boot.enable = true;"));
    assert!(out.contains("system.stateVersion = \"24.05\";"));
}

#[test]
fn new_binding_adds_one_line_to_multiline_sets() {
    let mut src = parse(CONFIGURATION).unwrap();
    let out = set(&mut src, "time.timeZone", "\"Europe/Amsterdam\"").unwrap();
    // A fresh path with no attrpath family becomes an explicit nested set.
    assert_eq!(diff_counts(CONFIGURATION, &out), (0, 1));
    assert!(out.contains("time = { timeZone = \"Europe/Amsterdam\"; };"));

    let reread = parse(&out).unwrap();
    assert_eq!(get(&reread, "time.timeZone").unwrap(), "\"Europe/Amsterdam\"");
}

#[test]
fn new_leaf_joins_an_existing_attrpath_family() {
    let mut src = parse(CONFIGURATION).unwrap();
    let out = set(&mut src, "boot.loader.timeout", "5").unwrap();
    assert_eq!(diff_counts(CONFIGURATION, &out), (0, 1));
    assert!(out.contains("boot.loader.timeout = 5;"));
}

#[test]
fn edited_corpus_files_stay_parseable() {
    let mut src = parse(DERIVATION).unwrap();
    let out = set(&mut src, "pname", "\"renamed\"").unwrap();
    let reread = parse(&out).unwrap();
    assert!(!reread.contains_error());
    assert_eq!(reread.rebuild(), out);
}
