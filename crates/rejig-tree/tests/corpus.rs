//! Round-trip fidelity over realistic configuration files.
//!
//! Every file here must reconstruct byte-for-byte, and parse without
//! errors so it stays editable.

use rejig_tree::{parse, Expr, Source};

fn assert_roundtrip(text: &str) {
    let source = parse(text).expect("parse");
    assert!(
        !source.contains_error(),
        "corpus file should parse cleanly: {:?}",
        source.errors()
    );
    assert_eq!(source.rebuild(), text);
    assert!(Source::round_trip_check(text));
}

#[test]
fn flake() {
    assert_roundtrip(
        r#"{
  description = "demo flake";

  inputs = {
    nixpkgs.url = "github:NixOS/nixpkgs/nixos-24.05";
    flake-utils.url = "github:numtide/flake-utils";
  };

  outputs = { self, nixpkgs, flake-utils }:
    flake-utils.lib.eachDefaultSystem (system:
      let
        pkgs = import nixpkgs { inherit system; };
      in
      {
        packages.default = pkgs.hello;

        devShells.default = pkgs.mkShell {
          packages = [ pkgs.rustc pkgs.cargo ];
        };
      });
}
"#,
    );
}

#[test]
fn nixos_configuration() {
    assert_roundtrip(
        r#"{ config, pkgs, ... }:

{
  imports = [ ./hardware-configuration.nix ];

  boot.loader.systemd-boot.enable = true;
  boot.loader.efi.canTouchEfiVariables = true;

  networking.hostName = "mox"; # define your hostname

  time.timeZone = "Europe/Amsterdam";

  users.users.demo = {
    isNormalUser = true;
    extraGroups = [ "wheel" ];
  };

  environment.systemPackages = with pkgs; [
    git
    vim
  ];

  system.stateVersion = "24.05";
}
"#,
    );
}

#[test]
fn derivation() {
    assert_roundtrip(
        r#"{ lib, stdenv, fetchurl }:

stdenv.mkDerivation rec {
  pname = "demo";
  version = "2.1.0";

  src = fetchurl {
    url = "https://example.org/demo-${version}.tar.gz";
    sha256 = "0000000000000000000000000000000000000000000000000000";
  };

  buildInputs = [ ];

  meta = with lib; {
    description = "A demonstration package";
    homepage = "https://example.org";
    license = licenses.mit;
    platforms = platforms.unix;
  };
}
"#,
    );
}

#[test]
fn overlay() {
    assert_roundtrip(
        r#"final: prev: {
  demo = prev.demo.overrideAttrs (old: {
    patches = (old.patches or [ ]) ++ [ ./fix.patch ];
  });
}
"#,
    );
}

#[test]
fn quoted_attribute_names() {
    assert_roundtrip(
        r#"{
  "com.example.app" = {
    enable = true;
  };

  services."nginx" = {
    virtualHosts."example.org".root = ./www;
  };
}
"#,
    );
}

#[test]
fn shell_with_comment_texture() {
    assert_roundtrip(
        r#"# Development environment.
{ pkgs ? import <nixpkgs> { } }:

pkgs.mkShell {
  # Toolchain
  packages = [
    pkgs.cargo # build
    pkgs.rustc

    pkgs.rust-analyzer
  ];

  /* Extra environment for the test-suite;
     kept in one place on purpose. */
  RUST_BACKTRACE = "1";
}
"#,
    );
}

#[test]
fn corpus_trees_expose_typed_values() {
    let source = parse("{ port = 8080; enable = true; name = \"demo\"; }").expect("parse");
    let tree = source.tree();
    let set = tree.expr(source.root()).as_attr_set().expect("attrset root");

    let values: Vec<_> = set
        .members
        .iter()
        .filter_map(|&m| tree.expr(m).as_binding())
        .map(|b| b.value)
        .collect();
    assert_eq!(tree.expr(values[0]).int_value(), Some(8080));
    assert_eq!(tree.expr(values[1]).bool_value(), Some(true));
    assert_eq!(
        tree.expr(values[2]).string_value(),
        Some("demo".to_string())
    );
    assert!(matches!(tree.expr(values[0]), Expr::Int(_)));
}
