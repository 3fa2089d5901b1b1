mod common;
use common::{local_session, path_str, recording_session, RecordingTransport};

use sshtask::{Context, Elevation, LsOptions, MkdirOptions, TaskErrorKind};

#[test]
fn env_scope_reaches_the_command() {
    let mut h = local_session("sshtask-env");
    let mut scoped = h.session.env([("FOO", "bar")]);
    let status = scoped.run("echo $FOO").expect("run");
    assert_eq!(status.stdout, "bar\n");
    assert_eq!(status.code, 0);
    drop(scoped);
    assert_eq!(h.terminal.output(), "bar\n");
}

#[test]
fn streamed_output_matches_captured_output() {
    let mut h = local_session("sshtask-stream");
    let status = h
        .session
        .run("printf \"é1\\nligne 2\\nno newline\"")
        .expect("run");
    assert_eq!(status.stdout, "é1\nligne 2\nno newline");
    assert_eq!(h.terminal.output(), status.stdout);
}

#[test]
fn stderr_is_captured_separately() {
    let mut h = local_session("sshtask-stderr");
    let status = h.session.run("echo out; echo err >&2").expect("run");
    assert_eq!(status.stdout, "out\n");
    assert_eq!(status.stderr, "err\n");
}

#[test]
fn mkdir_with_parents_is_idempotent() {
    let mut h = local_session("sshtask-mkdir");
    let target = path_str(&h.dir.join("x"));
    h.session.mkdir(&target).expect("first mkdir");
    h.session.mkdir(&target).expect("second mkdir");
    assert!(h.dir.join("x").is_dir());

    let strict = MkdirOptions {
        parents: false,
        mode: None,
    };
    let err = h.session.mkdir_with(&target, &strict).unwrap_err();
    assert_eq!(err.kind, TaskErrorKind::RemoteCommand);
    assert!(err.stderr().map(|s| !s.is_empty()).unwrap_or(false));
}

#[test]
fn mkdir_mode_is_rendered() {
    let (mut session, commands) = recording_session(RecordingTransport::new());
    let options = MkdirOptions {
        parents: true,
        mode: Some("750".into()),
    };
    session.mkdir_with("/srv/app", &options).expect("mkdir");
    assert_eq!(
        commands.borrow().as_slice(),
        ["sh -c 'mkdir --parents --mode=750 /srv/app'"]
    );
}

#[test]
fn ls_without_all_omits_the_flag() {
    let (mut session, commands) = recording_session(RecordingTransport::new());
    let options = LsOptions {
        all: false,
        ..LsOptions::default()
    };
    session.ls_with("/etc/", &options).expect("ls");
    assert_eq!(
        commands.borrow()[0],
        "sh -c 'ls --human-readable --size -l /etc/'"
    );
}

#[test]
fn elevation_as_named_user_logs_in() {
    let (mut session, commands) =
        recording_session(RecordingTransport::new().respond("alice\n", 0));
    let mut alice = session.sudo(Elevation::new().user("alice"));
    let status = alice.run("whoami").expect("whoami");
    assert_eq!(status.stdout, "alice\n");
    assert!(commands.borrow()[0]
        .starts_with("sudo --set-home --preserve-env --user=alice --login"));
}

#[test]
fn cp_and_chown_defaults() {
    let (mut session, commands) = recording_session(RecordingTransport::new());
    session.cp("/a", "/b").expect("cp");
    session.chown("www-data", "/b").expect("chown");
    session.mv("/b", "/c").expect("mv");
    assert_eq!(
        commands.borrow().as_slice(),
        [
            "sh -c 'cp --recursive /a /b'",
            "sh -c 'chown www-data /b'",
            "sh -c 'mv /b /c'",
        ]
    );
}

#[test]
fn exists_folds_empty_and_failed_probes_into_false() {
    let (mut session, _) = recording_session(
        RecordingTransport::new()
            .respond("1\n", 0)
            .respond("", 0)
            .respond("1\n", 2),
    );
    assert!(session.exists("/etc/hosts").expect("probe"));
    assert!(!session.exists("/nope").expect("probe"));
    assert!(!session.exists("/broken").expect("probe"));
}

#[test]
fn exists_against_the_local_filesystem() {
    let mut h = local_session("sshtask-exists");
    let file = h.dir.join("present");
    std::fs::write(&file, "x").expect("write");
    assert!(h.session.exists(&path_str(&file)).expect("probe"));
    assert!(!h.session.exists(&path_str(&h.dir.join("absent"))).expect("probe"));
}

#[test]
fn exists_sees_directories_created_by_mkdir() {
    let mut h = local_session("sshtask-exists-dir");
    let dir = path_str(&h.dir.join("folder/sub"));
    assert!(!h.session.exists(&dir).expect("probe before"));
    h.session.mkdir(&dir).expect("mkdir");
    assert!(h.session.exists(&dir).expect("probe after"));

    let moved = path_str(&h.dir.join("moved"));
    h.session.mv(&dir, &moved).expect("mv");
    assert!(!h.session.exists(&dir).expect("probe old"));
    assert!(h.session.exists(&moved).expect("probe new"));
}

#[test]
fn nonzero_exit_halts_the_script() {
    let mut h = local_session("sshtask-halt");
    let marker = h.dir.join("after");
    let script = |session: &mut sshtask::Session| -> Result<(), sshtask::TaskError> {
        session.run("echo before")?;
        session.run("echo boom >&2; exit 3")?;
        session.run(&format!("touch {}", marker.display()))?;
        Ok(())
    };
    let err = script(&mut h.session).unwrap_err();
    assert_eq!(err.kind, TaskErrorKind::RemoteCommand);
    assert_eq!(err.stderr(), Some("boom\n"));
    assert!(err.message.contains('3'));
    assert!(!marker.exists());
    assert_eq!(h.commands.borrow().len(), 2);
}

#[test]
fn cd_scope_changes_the_working_directory() {
    let mut h = local_session("sshtask-cd");
    let dir = path_str(&h.dir);
    let mut inside = h.session.cd(dir.clone());
    let status = inside.run("pwd").expect("pwd");
    assert_eq!(status.stdout.trim_end(), dir);
}

#[test]
fn scopes_are_restored_after_errors_and_panics() {
    let mut h = local_session("sshtask-restore");
    let failing = |session: &mut sshtask::Session| -> Result<(), sshtask::TaskError> {
        let mut dir = session.cd("/");
        let mut env = dir.env([("A", "1")]);
        let mut root = env.sudo(Elevation::new());
        root.run("exit 1")?;
        Ok(())
    };
    assert!(failing(&mut h.session).is_err());
    assert_eq!(h.session.context(), &Context::new());

    let session = &mut h.session;
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut dir = session.cd("/tmp");
        let _screen = dir.screen(Some("deploy"));
        panic!("body failed");
    }));
    assert!(result.is_err());
    assert_eq!(h.session.context(), &Context::new());
}

#[test]
fn dry_run_renders_without_running() {
    let mut h = local_session("sshtask-dry");
    h.session.set_dry_run(true);
    let marker = h.dir.join("never");
    let status = h
        .session
        .run(&format!("touch {}", marker.display()))
        .expect("dry run");
    assert_eq!(status.stdout, "[dry-run]");
    assert!(!marker.exists());
    assert!(h.commands.borrow().is_empty());
}
