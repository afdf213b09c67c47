//! Interactive login wait loop and stored-session verification.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeDriver, Reply, config, cookie, endpoints, stored_record};
use tempfile::TempDir;
use usagewatch::{AuthenticationFlow, BrowserMode, Error, MonitorConfig, SessionStore};

struct Harness {
	driver: FakeDriver,
	store: Arc<SessionStore>,
	flow: AuthenticationFlow<FakeDriver>,
	_temp: TempDir,
}

fn harness_with(config: MonitorConfig) -> Harness {
	let temp = TempDir::new().unwrap();
	let driver = FakeDriver::new();
	let store = Arc::new(SessionStore::new(temp.path().join("session.json")));
	let flow = AuthenticationFlow::new(Arc::new(driver.clone()), Arc::clone(&store), endpoints(), &config);
	Harness {
		driver,
		store,
		flow,
		_temp: temp,
	}
}

fn harness() -> Harness {
	harness_with(config())
}

#[tokio::test(start_paused = true)]
async fn login_times_out_and_closes_browser() {
	let h = harness();

	let started = tokio::time::Instant::now();
	let err = h.flow.login_interactive().await.unwrap_err();

	assert!(matches!(err, Error::AuthTimeout(_)), "got {err}");
	assert!(started.elapsed().as_secs() >= 300);
	assert_eq!(h.driver.closes(), 1);
	assert_eq!(h.driver.org_calls(), 0);
	assert_eq!(SessionStore::new(h.store.path()).load(), None);
}

#[tokio::test(start_paused = true)]
async fn named_cookie_and_successful_probe_persist_the_session() {
	let h = harness();
	h.driver.script(|s| {
		s.jars.push_back(vec![cookie("cf_bm", "x")]);
		s.jars.push_back(vec![cookie("cf_bm", "x")]);
		s.jars.push_back(vec![
			cookie("cf_bm", "x"),
			cookie("sessionKey", "sk-ant-new"),
			cookie("lastActiveOrg", "org-9"),
		]);
	});

	let record = h.flow.login_interactive().await.unwrap();

	assert_eq!(record.get("sessionKey"), Some("sk-ant-new"));
	assert_eq!(record.len(), 3);
	assert_eq!(SessionStore::new(h.store.path()).load(), Some(record));

	let state = h.driver.state.lock();
	assert_eq!(state.launches[0].0, BrowserMode::Visible);
	assert!(state.launches[0].1.is_empty());
	assert_eq!(state.gotos, vec!["https://claude.ai/".to_string()]);
	assert_eq!(state.org_calls, 1);
	assert_eq!(state.closes, 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_or_failed_probe_keeps_waiting() {
	let h = harness();
	h.driver.script(|s| {
		s.jars.push_back(vec![cookie("sessionKey", "sk-ant-pending")]);
		s.org_replies.push_back(Reply::status(401));
		s.org_replies.push_back(Reply::Fail);
	});

	let started = tokio::time::Instant::now();
	let record = h.flow.login_interactive().await.unwrap();

	assert_eq!(h.driver.org_calls(), 3);
	assert_eq!(record.get("sessionKey"), Some("sk-ant-pending"));
	// Two failed ticks at the 3s check interval.
	assert_eq!(started.elapsed().as_secs(), 6);
}

#[tokio::test(start_paused = true)]
async fn sign_in_check_leaves_the_identity_page_alone() {
	let h = harness();
	h.driver.script(|s| {
		s.jars.push_back(vec![cookie("sessionKey", "sk-ant-partial")]);
		s.page_origin = Some("https://accounts.google.com".into());
	});
	let driver = h.driver.clone();
	let flow = Arc::new(h.flow);
	let login = tokio::spawn({
		let flow = Arc::clone(&flow);
		async move { flow.login_interactive().await }
	});

	tokio::time::sleep(Duration::from_secs(10)).await;
	{
		let state = driver.state.lock();
		assert_eq!(state.gotos, vec!["https://claude.ai/".to_string()]);
		assert!(state.in_place_requests >= 3, "{} checks", state.in_place_requests);
		assert_eq!(state.org_calls, 0);
	}

	// The identity provider redirects back to the service.
	driver.script(|s| s.page_origin = None);
	let record = login.await.unwrap().unwrap();

	assert_eq!(record.get("sessionKey"), Some("sk-ant-partial"));
	assert_eq!(driver.state.lock().gotos.len(), 1);
	assert_eq!(driver.org_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cookie_growth_beyond_threshold_triggers_probe() {
	let h = harness();
	h.driver.script(|s| {
		s.jars.push_back(vec![cookie("a", "1")]);
		// Grew by exactly the threshold: not enough.
		s.jars.push_back((0..4).map(|i| cookie(&format!("c{i}"), "v")).collect());
		s.jars.push_back((0..5).map(|i| cookie(&format!("c{i}"), "v")).collect());
	});

	let record = h.flow.login_interactive().await.unwrap();

	assert_eq!(h.driver.org_calls(), 1);
	assert_eq!(record.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn growth_threshold_is_configurable() {
	let h = harness_with(MonitorConfig {
		cookie_growth_threshold: 10,
		login_timeout_secs: 30,
		..config()
	});
	h.driver.script(|s| s.jars.push_back((0..5).map(|i| cookie(&format!("c{i}"), "v")).collect()));
	h.driver.script(|s| s.jars.push_front(Vec::new()));

	let err = h.flow.login_interactive().await.unwrap_err();
	assert!(matches!(err, Error::AuthTimeout(_)));
	assert_eq!(h.driver.org_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_persistence_fails_login_but_closes_browser() {
	let temp = TempDir::new().unwrap();
	let blocker = temp.path().join("occupied");
	std::fs::write(&blocker, "file, not a directory").unwrap();

	let driver = FakeDriver::new();
	driver.script(|s| s.jars.push_back(vec![cookie("sessionKey", "sk")]));
	let store = Arc::new(SessionStore::new(blocker.join("session.json")));
	let flow = AuthenticationFlow::new(Arc::new(driver.clone()), store, endpoints(), &config());

	assert!(flow.login_interactive().await.is_err());
	assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn launch_failure_is_fatal() {
	let h = harness();
	h.driver.script(|s| s.fail_launch = true);

	let err = h.flow.login_interactive().await.unwrap_err();
	assert!(err.is_fatal());
}

#[tokio::test]
async fn verify_accepts_200_with_injected_cookies() {
	let h = harness();

	assert!(h.flow.verify_session(&stored_record()).await);

	let state = h.driver.state.lock();
	assert_eq!(state.launches[0], (BrowserMode::Headless, stored_record()));
	assert_eq!(state.org_calls, 1);
	assert_eq!(state.closes, 1);
}

#[tokio::test]
async fn verify_rejects_non_200_and_errors() {
	let h = harness();
	h.driver.script(|s| {
		s.org_replies.push_back(Reply::Respond(403, "{\"error\":\"forbidden\"}".into()));
		s.org_replies.push_back(Reply::Fail);
	});

	assert!(!h.flow.verify_session(&stored_record()).await);
	assert!(!h.flow.verify_session(&stored_record()).await);
	assert_eq!(h.driver.closes(), 2);

	h.driver.script(|s| s.fail_launch = true);
	assert!(!h.flow.verify_session(&stored_record()).await);
}
