mod common;

use common::{environment, put_objects};
use imeta::catalog::TargetKind;
use imeta::driver::Expectation;
use imeta::driver::fixture::Environment;

const ATTRIBUTE: &str = "test_imeta_addw_attribute";
const VALUE: &str = "test_imeta_addw_value";

/// How many of `<home>/file_0..count` carry any AVU at all.
fn tagged_objects(env: &Environment, home: &str, count: usize) -> usize {
    env.store()
        .read(|catalog| {
            Ok((0..count)
                .filter_map(|i| catalog.avus(TargetKind::DataObject, &format!("{home}/file_{i}")))
                .filter(|avus| !avus.is_empty())
                .count())
        })
        .unwrap()
}

#[test]
fn addw_tags_every_matching_object() {
    let env = environment();
    put_objects(&env.admin, "file_", 5);
    env.admin
        .assert_icommand("icat ls", Expectation::stdout_singleline("file_"))
        .unwrap();

    env.admin
        .assert_icommand(
            ["imeta", "addw", "-d", "file_%", ATTRIBUTE, VALUE],
            Expectation::stdout_singleline("AVU added to 5 data-objects"),
        )
        .unwrap();

    for i in 0..5 {
        let listing = format!("imeta ls -d file_{i}");
        env.admin
            .assert_icommand(
                listing.as_str(),
                Expectation::stdout_singleline(format!("attribute: {ATTRIBUTE}")),
            )
            .unwrap();
        env.admin
            .assert_icommand(
                listing.as_str(),
                Expectation::stdout_singleline(format!("value: {VALUE}")),
            )
            .unwrap();
    }
}

#[test]
fn addw_on_another_users_objects_is_refused() {
    let env = environment();
    put_objects(&env.admin, "file_", 5);
    env.admin
        .assert_icommand("icat ls", Expectation::stdout_singleline("file_"))
        .unwrap();

    let wild = format!("{}/file_%", env.admin.home_collection());
    env.user0
        .assert_icommand(
            ["imeta", "addw", "-d", wild.as_str(), ATTRIBUTE, VALUE],
            Expectation::stderr_singleline("CAT_NO_ACCESS_PERMISSION"),
        )
        .unwrap();
    assert_eq!(tagged_objects(&env, &env.admin.home_collection(), 5), 0);
}

#[test]
fn addw_by_admin_on_user_objects_is_refused_and_changes_nothing() {
    let env = environment();
    put_objects(&env.user0, "file_", 5);
    env.user0
        .assert_icommand("icat ls", Expectation::stdout_singleline("file_"))
        .unwrap();

    let wild = format!("{}/file_%", env.user0.home_collection());
    env.admin
        .assert_icommand(
            ["imeta", "addw", "-d", wild.as_str(), ATTRIBUTE, VALUE],
            Expectation::stderr_singleline("CAT_NO_ACCESS_PERMISSION"),
        )
        .unwrap();

    assert_eq!(tagged_objects(&env, &env.user0.home_collection(), 5), 0);
}

#[test]
fn addw_is_all_or_nothing_on_mixed_permissions() {
    let env = environment();
    put_objects(&env.user0, "mixed_", 3);
    let home = env.user0.home_collection();
    let first = format!("{home}/mixed_0");
    env.user0
        .assert_icommand(
            ["icat", "chmod", "write", env.user1.username(), first.as_str()],
            Expectation::success(),
        )
        .unwrap();

    let wild = format!("{home}/mixed_%");
    env.user1
        .assert_icommand(
            ["imeta", "addw", "-d", wild.as_str(), "a", "v"],
            Expectation::stderr_singleline("CAT_NO_ACCESS_PERMISSION"),
        )
        .unwrap();
    env.user0
        .assert_icommand(
            ["imeta", "ls", "-d", first.as_str()],
            Expectation::stdout_singleline("None"),
        )
        .unwrap();

    env.user1
        .assert_icommand(
            ["imeta", "addw", "-d", first.as_str(), "a", "v"],
            Expectation::stdout_singleline("AVU added to 1 data-objects"),
        )
        .unwrap();
}

#[test]
fn addw_without_matches_reports_no_rows() {
    let env = environment();
    env.admin
        .assert_icommand(
            ["imeta", "addw", "-d", "nothing_%", "a", "v"],
            Expectation::stderr_singleline("CAT_NO_ROWS_FOUND"),
        )
        .unwrap();
}

#[test]
fn addw_skips_objects_already_tagged() {
    let env = environment();
    put_objects(&env.admin, "file_", 3);
    env.admin
        .assert_icommand(["imeta", "add", "-d", "file_1", "a", "v"], Expectation::success())
        .unwrap();
    env.admin
        .assert_icommand(
            ["imeta", "addw", "-d", "file_%", "a", "v"],
            Expectation::stdout_singleline("AVU added to 2 data-objects"),
        )
        .unwrap();
}

#[test]
fn rmw_and_lsw_use_like_patterns() {
    let env = environment();
    put_objects(&env.admin, "obj_", 1);
    for (a, v, u) in [("size_a", "1", ""), ("size_b", "2", "kb"), ("name", "x", "")] {
        env.admin
            .assert_icommand(["imeta", "add", "-d", "obj_0", a, v, u], Expectation::success())
            .unwrap();
    }

    let listing = env
        .admin
        .assert_icommand(
            "imeta lsw -d obj_0 size_%",
            Expectation::stdout_multiline(["attribute: size_a", "attribute: size_b"]),
        )
        .unwrap();
    assert!(!listing.stdout.contains("attribute: name"));

    // No units pattern: only AVUs with empty units go.
    env.admin
        .assert_icommand("imeta rmw -d obj_0 size_% %", Expectation::success())
        .unwrap();
    let remaining = env.admin.run_icommand("imeta ls -d obj_0").unwrap();
    assert!(!remaining.stdout.contains("attribute: size_a"));
    assert!(remaining.stdout.contains("attribute: size_b"));
    assert!(remaining.stdout.contains("attribute: name"));
}

#[test]
fn data_object_avus_need_write_access() {
    let env = environment();
    env.user0
        .assert_icommand(
            format!("imeta add -d {}/testfile.txt a v", env.admin.home_collection()),
            Expectation::stderr_singleline("CAT_NO_ACCESS_PERMISSION"),
        )
        .unwrap();
    env.user0
        .assert_icommand(
            format!("imeta ls -d {}/testfile.txt", env.admin.home_collection()),
            Expectation::stderr_singleline("CAT_NO_ACCESS_PERMISSION"),
        )
        .unwrap();
}

#[test]
fn collection_avus_round_trip_through_ls() {
    let env = environment();
    env.user1
        .assert_icommand("icat mkdir runs", Expectation::success())
        .unwrap();
    env.user1
        .assert_icommand("imeta set -C runs status done", Expectation::success())
        .unwrap();
    env.user1
        .assert_icommand(
            "imeta ls -C runs",
            Expectation::stdout_multiline([
                format!("AVUs defined for collection {}/runs:", env.user1.home_collection()),
                "attribute: status".to_owned(),
                "value: done".to_owned(),
            ]),
        )
        .unwrap();
}
