use std::sync::Arc;

use drover::{ExecutionConfig, Orchestrator};
use drover_cli::commands::{check_devices, list_devices, print_environment};
use drover_protocol::{Browser, Device, DeviceType, DriverScope, Environment, MobilePlatform};
use drover_runtime::testing::FakeResolver;

fn config() -> ExecutionConfig {
	let mut config = ExecutionConfig::new();
	config.driver.scope = Some(DriverScope::Suite);
	config.driver.grid_url = Some("http://grid:4444/wd/hub".into());
	config.environments.insert(
		"staging".into(),
		Environment::new("staging")
			.with_device(Device::web("chrome", Browser::Chrome))
			.with_device(Device::mobile("pixel", MobilePlatform::Android).with_scope(DriverScope::Method))
			.with_param("baseUrl", "https://staging.example.com"),
	);
	config.environments.insert("empty".into(), Environment::new("empty"));
	config
}

fn output(buf: Vec<u8>) -> String {
	String::from_utf8(buf).unwrap()
}

#[test]
fn env_prints_selected_environment_as_json() {
	let mut buf = Vec::new();
	print_environment(&config(), Some("staging"), &mut buf).unwrap();
	let env: serde_json::Value = serde_json::from_str(&output(buf)).unwrap();
	assert_eq!(env["name"], "staging");
	assert_eq!(env["devices"][1]["type"], "mobile");
	assert_eq!(env["params"]["baseUrl"], "https://staging.example.com");
}

#[test]
fn env_rejects_unknown_name() {
	let err = print_environment(&config(), Some("prod"), &mut Vec::new()).unwrap_err();
	assert!(format!("{err:#}").contains("unknown environment 'prod'"));
}

#[test]
fn devices_show_effective_scope_and_endpoint() {
	let mut buf = Vec::new();
	list_devices(&config(), &mut buf).unwrap();
	let text = output(buf);

	let chrome = text.lines().find(|l| l.contains("chrome")).unwrap();
	assert!(chrome.contains("suite"));
	assert!(chrome.contains("http://grid:4444/wd/hub"));

	let pixel = text.lines().find(|l| l.contains("pixel")).unwrap();
	assert!(pixel.contains("method"));
	assert!(pixel.trim_end().ends_with('-'));
	assert!(text.contains("(no devices)"));
}

fn builder(web: &Arc<FakeResolver>, mobile: &Arc<FakeResolver>) -> drover::OrchestratorBuilder {
	Orchestrator::builder(config())
		.environment("staging")
		.without_default_resolvers()
		.resolver(web.clone())
		.resolver(mobile.clone())
}

#[tokio::test]
async fn check_reports_each_device_and_quits_all() {
	let web = Arc::new(FakeResolver::new(DeviceType::Web));
	let mobile = Arc::new(FakeResolver::new(DeviceType::Mobile).failing());

	let mut buf = Vec::new();
	let report = check_devices(builder(&web, &mobile), None, &mut buf).await.unwrap();
	let text = output(buf);

	assert_eq!(report.started, vec!["chrome".to_string()]);
	assert_eq!(report.failed.len(), 1);
	assert!(!report.is_success());

	let pixel = text.lines().find(|l| l.contains("pixel")).unwrap();
	assert!(pixel.contains("FAIL"));
	assert!(pixel.contains("fake resolver refused pixel"));
	assert!(text.lines().any(|l| l.contains("OK") && l.contains("chrome")));

	assert_eq!(web.created()[0].quit_count(), 1);
}

#[tokio::test]
async fn check_can_target_one_device() {
	let web = Arc::new(FakeResolver::new(DeviceType::Web));
	let mobile = Arc::new(FakeResolver::new(DeviceType::Mobile));

	let report = check_devices(builder(&web, &mobile), Some("pixel"), &mut Vec::new())
		.await
		.unwrap();
	assert!(report.is_success());
	assert_eq!(report.total(), 1);
	assert_eq!(web.init_count(), 0);

	let err = check_devices(builder(&web, &mobile), Some("iphone"), &mut Vec::new())
		.await
		.unwrap_err();
	assert!(err.to_string().contains("no device named 'iphone'"));
}
