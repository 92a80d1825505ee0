use std::process::{Command, Output};

/// Run `git` in the package directory; `None` when git is missing or fails.
fn git(args: &[&str]) -> Option<Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|out| out.status.success())
}

fn main() {
    // Version string changes on commit, checkout and tagging
    for watched in [".git/HEAD", ".git/refs/heads", ".git/refs/tags"] {
        println!("cargo:rerun-if-changed={watched}");
    }

    let commit = git(&["rev-parse", "--short", "HEAD"])
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_owned())
        .unwrap_or_default();
    let tagged = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    println!("cargo:rustc-env=GIT_HASH={commit}");
    println!("cargo:rustc-env=ON_RELEASE_TAG={tagged}");
}
