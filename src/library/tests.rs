//! Tests for provisioning, command shaping, clocks, logs, and lifecycle.

use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::config::ConfigError;
use crate::device::{DeviceError, Since};
use crate::factory::FactoryError;
use crate::test_support::{ScriptedDevice, ScriptedFactory};

const DEVICE_NANOS: &str = "1700000000123456789";

fn test_config() -> LibraryConfig {
    LibraryConfig {
        retry_attempts: 1,
        env_file: String::from("missing-test.env"),
        ..LibraryConfig::default()
    }
}

fn config_map(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

struct Scratch {
    _tmp: TempDir,
    root: Utf8PathBuf,
}

impl Scratch {
    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
        path
    }
}

#[fixture]
fn scratch() -> Scratch {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    Scratch { _tmp: tmp, root }
}

/// Library with one scripted factory registered for `variant`.
fn library_for(
    variant: AdapterVariant,
    config: LibraryConfig,
) -> (DeviceLibrary, ScriptedFactory, ScriptedDevice) {
    let device = ScriptedDevice::new("template");
    let factory = ScriptedFactory::new(variant);
    factory.push_device(device.clone());
    let library = DeviceLibrary::new(
        config,
        FactoryRegistry::new().with_factory(variant, factory.clone()),
    );
    (library, factory, device)
}

/// Docker device provisioned without bootstrap; its setup-time clock read
/// falls back to the host.
fn provisioned() -> (DeviceLibrary, ScriptedDevice) {
    let (mut library, _factory, device) = library_for(AdapterVariant::Docker, test_config());
    library
        .setup(SetupOptions::new().skip_bootstrap(true))
        .unwrap_or_else(|err| panic!("setup: {err}"));
    (library, device)
}

fn epoch(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid timestamp {seconds}"))
}

#[rstest]
fn unknown_adapter_fails_before_any_factory_call() {
    let (mut library, factory, _device) = library_for(AdapterVariant::Docker, test_config());
    let err = library
        .setup(SetupOptions::new().adapter("bogus"))
        .expect_err("bogus adapter should be rejected");
    assert!(matches!(err, LibraryError::InvalidConfiguration(_)));
    assert!(factory.requests().is_empty());
    assert!(library.registry().is_empty());
}

#[rstest]
fn missing_factory_reports_missing_adapter() {
    let (mut library, factory, _device) = library_for(AdapterVariant::Docker, test_config());
    let err = library
        .setup(SetupOptions::new().adapter("ssh"))
        .expect_err("ssh has no factory");
    assert_eq!(
        err,
        LibraryError::MissingAdapter {
            variant: AdapterVariant::Ssh
        }
    );
    assert!(err.to_string().contains("install the ssh backend integration"));
    assert!(factory.requests().is_empty());
    assert!(library.registry().is_empty());
}

#[rstest]
fn configured_default_adapter_is_used() {
    let config = LibraryConfig {
        adapter: String::from("local"),
        bootstrap_script: String::from("no-such-dir/bootstrap.sh"),
        ..test_config()
    };
    let (mut library, factory, _device) = library_for(AdapterVariant::Local, config);
    library
        .setup(SetupOptions::new())
        .unwrap_or_else(|err| panic!("setup: {err}"));
    assert_eq!(factory.requests().len(), 1);
    assert_eq!(
        library.get_device(None).map(ManagedDevice::variant),
        Ok(AdapterVariant::Local)
    );
}

#[rstest]
fn factory_failures_are_surfaced() {
    let (mut library, factory, _device) = library_for(AdapterVariant::Docker, test_config());
    factory.fail_with("daemon unreachable");
    let err = library
        .setup(SetupOptions::new().skip_bootstrap(true))
        .expect_err("construction should fail");
    assert_eq!(
        err,
        LibraryError::Factory(FactoryError::Construction {
            variant: AdapterVariant::Docker,
            message: String::from("daemon unreachable"),
        })
    );
    assert!(library.registry().is_empty());
}

#[rstest]
fn docker_request_carries_image_hosts_and_remaining_config(scratch: Scratch) {
    let env_file = scratch.write(
        "hosts.env",
        "DEVICELIBRARY_HOST_BROKER=\"mqtt://broker.local=10.0.0.5\"\nOTHER=value\n",
    );
    let settings = AdapterSettings::new().with_block(
        "DOCKER_CONFIG",
        config_map(json!({
            "image": "alpine-systemd",
            "skip_cleanup": "yes",
            "skip_bootstrap": true,
            "bootstrap_script": "./custom.sh",
            "privileged": true,
        })),
    );
    let (library, factory, device) = library_for(AdapterVariant::Docker, test_config());
    let mut library = library.with_adapter_settings(settings);

    let name = library
        .setup(SetupOptions::new().env_file(env_file.clone()))
        .unwrap_or_else(|err| panic!("setup: {err}"));

    let requests = factory.requests();
    let request = requests.first().unwrap_or_else(|| panic!("no request recorded"));
    assert_eq!(request.identifier, name);
    assert!(name.starts_with("TST_"), "name: {name}");
    assert_eq!(name, normalize_container_name(&name));
    assert_eq!(request.image.as_deref(), Some("alpine-systemd"));
    assert_eq!(request.env_file, env_file);
    assert!(request.env.is_empty());
    assert_eq!(
        request.extra_hosts,
        BTreeMap::from([(String::from("broker.local"), String::from("10.0.0.5"))])
    );
    assert_eq!(request.config, config_map(json!({ "privileged": true })));

    let managed = library.get_device(None).unwrap_or_else(|err| panic!("{err}"));
    assert!(!managed.should_cleanup());
    assert_eq!(device.command_strings(), vec!["date +%s%N"]);

    library.teardown();
    assert_eq!(device.cleanup_count(), 0);
}

#[rstest]
fn call_site_overrides_win_over_the_variant_block() {
    let settings = AdapterSettings::new().with_block(
        "DOCKER_CONFIG",
        config_map(json!({ "image": "from-block", "skip_cleanup": true })),
    );
    let (library, factory, _device) = library_for(AdapterVariant::Docker, test_config());
    let mut library = library.with_adapter_settings(settings);

    library
        .setup(
            SetupOptions::new()
                .skip_bootstrap(true)
                .cleanup(true)
                .with_override("image", "from-call"),
        )
        .unwrap_or_else(|err| panic!("setup: {err}"));

    let requests = factory.requests();
    assert_eq!(
        requests.first().and_then(|request| request.image.as_deref()),
        Some("from-call")
    );
    assert_eq!(
        library.get_device(None).map(ManagedDevice::should_cleanup),
        Ok(true)
    );
}

#[rstest]
fn ssh_setup_injects_device_id_and_transfers_bootstrap(scratch: Scratch) {
    let script = scratch.write("bootstrap.sh", "#!/bin/sh\necho ready\n");
    let config = LibraryConfig {
        bootstrap_script: script.to_string(),
        ..test_config()
    };
    let (mut library, factory, device) = library_for(AdapterVariant::Ssh, config);
    device.push_output(0, DEVICE_NANOS, "");
    device.push_output(0, "ready", "");

    let name = library
        .setup(SetupOptions::new().adapter("ssh"))
        .unwrap_or_else(|err| panic!("setup: {err}"));

    let requests = factory.requests();
    let request = requests.first().unwrap_or_else(|| panic!("no request recorded"));
    assert_eq!(request.env.get(DEVICE_ID_ENV), Some(&name));
    assert_eq!(request.image, None);
    assert!(request.extra_hosts.is_empty());

    let transfers = device.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers.first().map(|transfer| &transfer.source), Some(&script));
    assert_eq!(
        transfers.first().map(|transfer| transfer.destination.as_str()),
        Some(".")
    );

    let commands = device.commands();
    assert_eq!(
        device.command_strings(),
        vec!["date +%s%N", "./bootstrap.sh"]
    );
    assert_eq!(commands.get(1).and_then(|command| command.options.shell), Some(true));
    assert_eq!(
        library.get_setup_time(None),
        Ok(Some(DateTime::from_timestamp_nanos(1_700_000_000_123_456_789)))
    );
}

#[rstest]
fn skipped_bootstrap_still_transfers_the_script(scratch: Scratch) {
    let script = scratch.write("bootstrap.sh", "#!/bin/sh\n");
    let config = LibraryConfig {
        bootstrap_script: script.to_string(),
        ..test_config()
    };
    let (mut library, _factory, device) = library_for(AdapterVariant::Local, config);

    library
        .setup(SetupOptions::new().adapter("local").skip_bootstrap(true))
        .unwrap_or_else(|err| panic!("setup: {err}"));

    assert_eq!(device.transfers().len(), 1);
    assert_eq!(device.command_strings(), vec!["date +%s%N"]);
}

#[rstest]
fn missing_bootstrap_script_forces_skip(scratch: Scratch) {
    let config = LibraryConfig {
        bootstrap_script: scratch.root.join("absent.sh").to_string(),
        ..test_config()
    };
    let (mut library, _factory, device) = library_for(AdapterVariant::Local, config);

    library
        .setup(SetupOptions::new().adapter("local").skip_bootstrap(false))
        .unwrap_or_else(|err| panic!("setup: {err}"));

    assert!(device.transfers().is_empty());
    assert_eq!(device.command_strings(), vec!["date +%s%N"]);
}

#[rstest]
fn failed_bootstrap_transfer_keeps_device_for_teardown(scratch: Scratch) {
    let script = scratch.write("bootstrap.sh", "#!/bin/sh\n");
    let config = LibraryConfig {
        bootstrap_script: script.to_string(),
        ..test_config()
    };
    let (mut library, _factory, device) = library_for(AdapterVariant::Ssh, config);
    device.fail_transfers("permission denied");

    let err = library
        .setup(SetupOptions::new().adapter("ssh"))
        .expect_err("transfer should fail");
    assert!(matches!(
        err,
        LibraryError::Device(DeviceError::TransferFailed { .. })
    ));
    assert_eq!(library.registry().len(), 1);

    library.teardown();
    assert_eq!(device.cleanup_count(), 1);
}

#[rstest]
fn bootstrap_failure_propagates() {
    let (mut library, _factory, device) = library_for(AdapterVariant::Docker, test_config());
    device.push_output(0, DEVICE_NANOS, "");
    device.push_failure(2);

    let err = library
        .setup(SetupOptions::new())
        .expect_err("bootstrap should fail");
    assert!(matches!(
        err,
        LibraryError::Device(DeviceError::CommandFailed { exit_code: 2, .. })
    ));
    assert_eq!(
        device.command_strings(),
        vec!["date +%s%N", "./bootstrap.sh"]
    );
}

#[rstest]
fn operations_before_setup_have_no_current_device() {
    let (library, _factory, _device) = library_for(AdapterVariant::Docker, test_config());
    assert_eq!(
        library.execute_command("true", &ExecuteOptions::new()),
        Err(LibraryError::NoCurrentDevice)
    );
    assert_eq!(library.get_setup_time(None), Err(LibraryError::NoCurrentDevice));
}

#[rstest]
#[case(true, false, false, Some("  out \n"), None)]
#[case(false, true, false, None, Some("  err \n"))]
#[case(true, true, true, Some("out"), Some("err"))]
#[case(false, false, true, None, None)]
fn execute_command_shapes_output(
    #[case] stdout: bool,
    #[case] stderr: bool,
    #[case] strip: bool,
    #[case] expected_stdout: Option<&str>,
    #[case] expected_stderr: Option<&str>,
) {
    let (library, device) = provisioned();
    device.push_output(0, "  out \n", "  err \n");
    let options = ExecuteOptions::new()
        .stdout(stdout)
        .stderr(stderr)
        .strip(strip);

    let outputs = library
        .execute_command("echo", &options)
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(outputs.stdout.as_deref(), expected_stdout);
    assert_eq!(outputs.stderr.as_deref(), expected_stderr);
    assert_eq!(outputs.is_empty(), !stdout && !stderr);
}

#[rstest]
fn execute_command_checks_and_ignores_exit_codes() {
    let (library, device) = provisioned();
    device.push_failure(5);
    device.push_failure(5);
    device.push_failure(5);

    let err = library
        .execute_command("false", &ExecuteOptions::new())
        .expect_err("non-zero exit should fail");
    assert!(matches!(
        err,
        LibraryError::Device(DeviceError::CommandFailed { exit_code: 5, .. })
    ));

    let ignored = library
        .execute_command("false", &ExecuteOptions::new().ignore_exit_code(true))
        .unwrap_or_else(|err| panic!("ignored exit code: {err}"));
    assert_eq!(ignored.stdout_or_default(), "");

    let expected = library
        .execute_command("false", &ExecuteOptions::new().exp_exit_code(ExitCode::NonZero));
    assert!(expected.is_ok());
}

#[rstest]
#[case(None, None)]
#[case(Some(true), Some(true))]
#[case(Some(false), Some(false))]
fn sudo_is_forwarded_only_when_set(#[case] sudo: Option<bool>, #[case] forwarded: Option<bool>) {
    let (library, device) = provisioned();
    device.push_success();
    let options = sudo.map_or_else(ExecuteOptions::new, |value| {
        ExecuteOptions::new().sudo(value)
    });

    library
        .execute_command("id -u", &options)
        .unwrap_or_else(|err| panic!("execute: {err}"));

    let commands = device.commands();
    assert_eq!(commands.last().and_then(|command| command.options.sudo), forwarded);
}

#[rstest]
fn execute_command_targets_named_devices() {
    let (mut library, factory, first) = library_for(AdapterVariant::Docker, test_config());
    let second = ScriptedDevice::new("second-template");
    factory.push_device(second.clone());
    let first_name = library
        .setup(SetupOptions::new().skip_bootstrap(true))
        .unwrap_or_else(|err| panic!("setup: {err}"));
    let second_name = library
        .setup(SetupOptions::new().skip_bootstrap(true))
        .unwrap_or_else(|err| panic!("setup: {err}"));
    assert_eq!(library.registry().current_name(), Some(second_name.as_str()));

    first.push_output(0, "first", "");
    let outputs = library
        .execute_command("hostname", &ExecuteOptions::new().device_name(first_name.clone()))
        .unwrap_or_else(|err| panic!("execute: {err}"));
    assert_eq!(outputs.stdout.as_deref(), Some("first"));
    assert_eq!(second.command_strings(), vec!["date +%s%N"]);

    library
        .set_current(&first_name)
        .unwrap_or_else(|err| panic!("set_current: {err}"));
    assert_eq!(
        library.get_device(None).map(Device::id),
        Ok(first_name.as_str())
    );

    let err = library.set_current("missing").expect_err("unknown device");
    let LibraryError::NotFound { name, available } = err else {
        panic!("expected NotFound, got {err:?}");
    };
    assert_eq!(name, "missing");
    assert_eq!(available.len(), 2);
}

#[rstest]
fn precise_timestamp_uses_nanoseconds() {
    let (library, device) = provisioned();
    device.push_output(0, format!("{DEVICE_NANOS}\n"), "");
    assert_eq!(
        library.get_unix_timestamp(true),
        Ok(DateTime::from_timestamp_nanos(1_700_000_000_123_456_789))
    );
}

#[rstest]
#[case::literal_suffix("1700000000N\n")]
#[case::dropped_directive("1700000000\n")]
fn timestamp_falls_back_to_seconds_without_nanosecond_support(#[case] precise_output: &str) {
    let (library, device) = provisioned();
    device.push_output(0, precise_output, "");
    device.push_output(0, "1700000000\n", "");

    assert_eq!(library.get_unix_timestamp(true), Ok(epoch(1_700_000_000)));
    let commands = device.command_strings();
    assert_eq!(
        commands.iter().rev().take(2).map(String::as_str).collect::<Vec<_>>(),
        vec!["date +%s", "date +%s%N"]
    );
}

#[rstest]
fn garbled_clock_output_is_an_assertion() {
    let (library, device) = provisioned();
    device.push_output(0, "Tue Oct 18\n", "");
    assert!(matches!(
        library.get_unix_timestamp(false),
        Err(LibraryError::Assertion(_))
    ));
}

#[rstest]
fn host_timestamp_is_truncated_unless_precise() {
    let coarse = DeviceLibrary::get_unix_timestamp_from_host(false);
    assert_eq!(coarse.timestamp_subsec_nanos(), 0);
}

#[fixture]
fn logging_device() -> (DeviceLibrary, ScriptedDevice) {
    let (library, device) = provisioned();
    for line in ["FOO bar", "baz", "xfoox"] {
        device.push_log(line);
    }
    (library, device)
}

#[rstest]
fn text_queries_match_case_insensitive_substrings(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    assert_eq!(
        library.assert_log_contains(&LogQuery::text("foo")),
        Ok(vec![String::from("FOO bar"), String::from("xfoox")])
    );
}

#[rstest]
fn patterns_are_anchored_at_line_start(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    assert_eq!(
        library.assert_log_contains(&LogQuery::pattern("foo")),
        Ok(vec![String::from("FOO bar")])
    );
    assert_eq!(
        library.assert_log_contains(&LogQuery::pattern(".*foo").min_matches(Some(2))),
        Ok(vec![String::from("FOO bar"), String::from("xfoox")])
    );
}

#[rstest]
fn minimum_bound_reports_wanted_and_got(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    let err = library
        .assert_log_contains(&LogQuery::text("foo").min_matches(Some(3)))
        .expect_err("two matches are fewer than three");
    let LibraryError::Assertion(message) = err else {
        panic!("expected an assertion error, got {err:?}");
    };
    assert!(message.contains("wanted=3 (min)\ngot=2"), "message: {message}");
}

#[rstest]
fn maximum_bound_reports_the_maximum(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    let err = library
        .assert_log_contains(&LogQuery::text("foo").max_matches(Some(1)))
        .expect_err("two matches exceed one");
    let LibraryError::Assertion(message) = err else {
        panic!("expected an assertion error, got {err:?}");
    };
    assert!(message.contains("greater than expected. wanted=1 (max)\ngot=2"), "message: {message}");
}

#[rstest]
fn not_contains_requires_zero_matches(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    assert_eq!(library.assert_log_not_contains(&LogQuery::text("qux")), Ok(()));
    assert!(matches!(
        library.assert_log_not_contains(&LogQuery::text("baz")),
        Err(LibraryError::Assertion(_))
    ));
}

#[rstest]
#[case(LogQuery::text("foo").with_pattern("foo"), "mutually exclusive")]
#[case(LogQuery::default(), "missing required argument")]
#[case(LogQuery::text(""), "missing required argument")]
#[case(LogQuery::pattern(""), "missing required argument")]
#[case(LogQuery::pattern("("), "invalid pattern")]
fn malformed_queries_are_argument_errors(
    logging_device: (DeviceLibrary, ScriptedDevice),
    #[case] query: LogQuery,
    #[case] fragment: &str,
) {
    let (library, device) = logging_device;
    let err = library
        .assert_log_contains(&query)
        .expect_err("query should be rejected");
    let LibraryError::InvalidArguments(message) = err else {
        panic!("expected InvalidArguments, got {err:?}");
    };
    assert!(message.contains(fragment), "message: {message}");
    assert!(device.log_queries().is_empty());
}

#[rstest]
fn date_from_filters_older_lines() {
    let (library, device) = provisioned();
    device.push_log_at(epoch(1_000), "service started");
    device.push_log_at(epoch(2_000), "service restarted");

    let matches = library
        .assert_log_contains(&LogQuery::text("service").date_from(epoch(1_500)))
        .unwrap_or_else(|err| panic!("logs: {err}"));

    assert_eq!(matches, vec![String::from("service restarted")]);
    assert_eq!(device.log_queries(), vec![Some(Since::Time(epoch(1_500)))]);
}

#[rstest]
fn failed_log_assertions_are_retried(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, device) = logging_device;
    let library = library.with_retry_policy(RetryPolicy::new(3, Duration::ZERO));

    let result = library.assert_log_contains(&LogQuery::text("missing"));

    assert!(matches!(result, Err(LibraryError::Assertion(_))));
    assert_eq!(device.log_queries().len(), 3);
}

#[rstest]
fn get_logs_returns_every_line(logging_device: (DeviceLibrary, ScriptedDevice)) {
    let (library, _device) = logging_device;
    assert_eq!(
        library.get_logs(None, None, true).map(|lines| lines.len()),
        Ok(3)
    );
}

#[rstest]
fn device_passthroughs_reach_the_current_device(scratch: Scratch) {
    let (library, device) = provisioned();
    device.set_ipaddress("172.17.0.2");
    let local = scratch.write("payload.tar", "data");

    assert_eq!(library.get_ipaddress(None), Ok(String::from("172.17.0.2")));
    library
        .disconnect_network(None)
        .unwrap_or_else(|err| panic!("disconnect: {err}"));
    assert!(!device.is_connected());
    library
        .connect_network(None)
        .unwrap_or_else(|err| panic!("connect: {err}"));
    assert!(device.is_connected());

    library
        .transfer_to_device(&local, "/tmp/payload.tar", None)
        .unwrap_or_else(|err| panic!("transfer: {err}"));
    assert_eq!(
        device
            .transfers()
            .first()
            .map(|transfer| transfer.destination.clone()),
        Some(String::from("/tmp/payload.tar"))
    );
}

#[rstest]
fn lifecycle_records_times_and_tears_down() {
    let (mut library, device) = provisioned();
    assert_eq!(library.get_suite_start_time(), None);

    library.start_suite();
    assert!(library.get_suite_start_time().is_some());

    device.push_output(0, DEVICE_NANOS, "");
    library.start_test();
    assert_eq!(
        library.get_test_start_time(),
        Some(DateTime::from_timestamp_nanos(1_700_000_000_123_456_789))
    );

    library.start_test();
    let fallback = library
        .get_test_start_time()
        .unwrap_or_else(|| panic!("test start time should be recorded"));
    assert_eq!(fallback.timestamp_subsec_nanos(), 0);

    library.end_test("checks services", false, "service was not running");
    library.end_suite("smoke", "done");
    assert!(library.registry().is_empty());
    assert_eq!(device.cleanup_count(), 1);
}

#[rstest]
fn random_names_use_the_prefix() {
    let name = DeviceLibrary::get_random_name("ABC");
    assert!(name.starts_with("ABC_"), "name: {name}");
    assert_ne!(name, DeviceLibrary::get_random_name("ABC"));
}

#[rstest]
fn config_errors_convert_into_library_errors() {
    let err = LibraryError::from(ConfigError::InvalidRetryAttempts);
    assert!(matches!(err, LibraryError::Config(_)));
}
