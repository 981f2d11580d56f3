#![allow(dead_code)]

use imeta::driver::fixture::Environment;
use imeta::driver::{Expectation, Programs, Session};

pub fn programs() -> Programs {
    Programs::new()
        .with("imeta", env!("CARGO_BIN_EXE_imeta"))
        .with("icat", env!("CARGO_BIN_EXE_icat"))
}

/// Fresh environment, checked the way every scenario expects to find it:
/// all users listed and none carrying metadata.
pub fn environment() -> Environment {
    let env = Environment::provision(programs()).expect("provision environment");
    let usernames: Vec<String> = env
        .sessions()
        .iter()
        .map(|session| session.username().to_owned())
        .collect();
    env.admin
        .assert_icommand("icat lu", Expectation::stdout_multiline(usernames.clone()))
        .expect("all users listed");
    for user in &usernames {
        env.admin
            .assert_icommand(
                format!("imeta ls -u {user}"),
                Expectation::stdout_singleline("None"),
            )
            .expect("no user metadata");
    }
    env
}

/// `ls` of one attribute must show exactly this AVU. `""` stands for empty
/// units.
pub fn check_avu(session: &Session, user: &str, attribute: &str, value: &str, units: &str) {
    let units = if units == "\"\"" { "" } else { units };
    let expectation = Expectation::stdout_multiline([
        format!("attribute: {}$", regex::escape(attribute)),
        format!("value: {}$", regex::escape(value)),
        format!("units: {}$", regex::escape(units)),
    ])
    .regex();
    session
        .assert_icommand(format!("imeta ls -u {user} {attribute}"), expectation)
        .unwrap_or_else(|err| panic!("{err}"));
}

pub fn set_and_check_avu(session: &Session, user: &str, attribute: &str, value: &str, units: &str) {
    session
        .assert_icommand(
            format!("imeta set -u {user} {attribute} {value} {units}"),
            Expectation::success(),
        )
        .unwrap_or_else(|err| panic!("{err}"));
    check_avu(session, user, attribute, value, units);
}

pub fn add_and_check_avu(session: &Session, user: &str, attribute: &str, value: &str, units: &str) {
    session
        .assert_icommand(
            format!("imeta add -u {user} {attribute} {value} {units}"),
            Expectation::success(),
        )
        .unwrap_or_else(|err| panic!("{err}"));
    check_avu(session, user, attribute, value, units);
}

/// Register `count` copies of the local test file as `<base><i>`.
pub fn put_objects(session: &Session, base: &str, count: usize) {
    for i in 0..count {
        let name = format!("{base}{i}");
        session
            .assert_icommand(
                ["icat", "put", "testfile.txt", name.as_str()],
                Expectation::success(),
            )
            .unwrap_or_else(|err| panic!("{err}"));
    }
}
