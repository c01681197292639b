use assert_cmd::Command;

#[test]
fn validate_keymap() {
    let mut cmd = Command::cargo_bin("ir-keytable").unwrap();

    let assert = cmd
        .args(["--test-keymap", "testdata/keymaps/hauppauge.toml"])
        .assert();

    let output = assert.get_output();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(stdout, "");
    assert_eq!(stderr, "");

    assert.success();
}

#[test]
fn validate_keymap_with_raw_entries() {
    let mut cmd = Command::cargo_bin("ir-keytable").unwrap();

    cmd.args(["--test-keymap", "testdata/keymaps/dish_network.toml"])
        .assert()
        .success();
}

#[test]
fn reject_bad_keymap() {
    let mut cmd = Command::cargo_bin("ir-keytable").unwrap();

    let assert = cmd
        .args(["--test-keymap", "testdata/keymaps/bad.toml"])
        .assert();

    let output = assert.get_output();

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(
        stderr,
        "error: testdata/keymaps/bad.toml: missing top level protocols array\n"
    );

    assert.failure();
}
