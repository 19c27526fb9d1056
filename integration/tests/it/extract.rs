use assert_fs::prelude::*;
use color_eyre::{eyre::Context, Result};
use simple_test_case::test_case;
use xshell::{cmd, Shell};

#[test_case(
    "registry-1.docker.io/library/alpine:latest";
    "alpine:latest"
)]
#[test_log::test]
#[cfg_attr(not(feature = "test-registry-interop"), ignore = "skipping tests that hit a real registry")]
fn registry(image: &str) -> Result<()> {
    let workspace = crate::workspace_root();
    let temp = assert_fs::TempDir::new().context("create temp dir")?;
    let output = temp.path().to_string_lossy().to_string();

    tracing::info!(workspace = %workspace.display(), "create shell");
    let sh = Shell::new().context("create shell")?;
    sh.change_dir(&workspace);

    tracing::info!(image, target = %output, "run stevedore extract");
    cmd!(sh, "cargo run -- extract {image} {output} --overwrite").run()?;

    temp.child("bin").assert(predicates::path::exists());
    Ok(())
}
