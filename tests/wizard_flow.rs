//! End-to-end wizard flows through the public API.
//!
//! Each submission builds a fresh manager over the same session store, the
//! way a server handles one request at a time.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use formstep::wizard::definition::load_definition;
use formstep::wizard::{
    step_data, CommitPolicy, FileSessionStore, FormRequest, FormStepConfig, FormStepManager,
    MemorySessionStore, RecordHooks, SessionStore, StateStore, StepData, StepId, StepOutcome,
    DEFAULT_SESSION_PREFIX,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

struct FixedHooks(i64);

impl RecordHooks for FixedHooks {
    fn create_record(&self, _data: &StepData, _state: &StateStore) -> anyhow::Result<i64> {
        Ok(self.0)
    }
}

fn signup_config() -> Arc<FormStepConfig> {
    let config = FormStepConfig::builder()
        .steps(["account", "profile", "confirm"])
        .required_save_steps(["account"])
        .rules(
            "account",
            [("email", "required|email"), ("password", "required|min:8")],
        )
        .rules("profile", [("age", "numeric|min_value:18")])
        .handler("profile", |data: &StepData, _: &mut StateStore| {
            match data.get("nickname").and_then(|v| v.as_text()) {
                Some("admin") => StepOutcome::failed(["Nickname is reserved"]),
                _ => StepOutcome::ok(),
            }
        })
        .record_hooks(FixedHooks(4242))
        .build()
        .expect("valid config");
    Arc::new(config)
}

/// Handle one request against the stored session, like a server would
fn submit(
    config: &Arc<FormStepConfig>,
    store: &Arc<dyn SessionStore>,
    request: FormRequest,
) -> FormStepManager {
    let state = StateStore::load(Arc::clone(store), "client-1", config.session_key("signup"))
        .expect("load state");
    let mut manager = FormStepManager::new(Arc::clone(config), state).expect("manager");
    manager.process(request).expect("process");
    manager
}

fn run_signup(store: Arc<dyn SessionStore>) {
    let config = signup_config();

    // Invalid account data keeps the user on the first step
    let m = submit(
        &config,
        &store,
        FormRequest::next(step_data([("email", "nope"), ("password", "short")])),
    );
    assert_eq!(m.current_step(), &StepId::from("account"));
    assert!(m.errors().has_field("email"));
    assert!(m.errors().has_field("password"));

    // Jumping ahead is refused while a required step is unsaved, even with
    // valid data for it
    let m = submit(
        &config,
        &store,
        FormRequest::goto(
            "confirm",
            step_data([("email", "ada@example.com"), ("password", "correct horse")]),
        ),
    );
    assert_eq!(m.current_step(), &StepId::from("account"));
    assert_eq!(
        m.errors().messages,
        vec!["Step account must be completed before proceeding".to_string()]
    );
    assert_eq!(m.correlation_id(), None);

    // Valid data advances and creates the backend record
    let m = submit(
        &config,
        &store,
        FormRequest::next(step_data([("email", "ada@example.com"), ("password", "correct horse")])),
    );
    assert_eq!(m.current_step(), &StepId::from("profile"));
    assert_eq!(m.correlation_id(), Some(4242));

    // Handler rejection keeps the step
    let m = submit(
        &config,
        &store,
        FormRequest::next(step_data([("nickname", "admin"), ("age", "30")])),
    );
    assert_eq!(m.current_step(), &StepId::from("profile"));
    assert_eq!(m.errors().messages, vec!["Nickname is reserved".to_string()]);

    let m = submit(
        &config,
        &store,
        FormRequest::next(step_data([("nickname", "ada"), ("age", "30")])),
    );
    assert_eq!(m.current_step(), &StepId::from("confirm"));

    // Going back keeps what was entered
    let m = submit(&config, &store, FormRequest::prev());
    assert_eq!(m.current_step(), &StepId::from("profile"));
    assert_eq!(m.current_step_data()["nickname"].as_text(), Some("ada"));

    // Jumping forward saves the step being left
    let m = submit(
        &config,
        &store,
        FormRequest::goto("confirm", step_data([("nickname", "ada"), ("age", "31")])),
    );
    assert_eq!(m.current_step(), &StepId::from("confirm"));

    let m = submit(&config, &store, FormRequest::complete(step_data([("terms", "yes")])));
    assert!(m.errors().is_empty());
    assert!(m.is_complete());

    let combined = m.combined_data();
    assert_eq!(combined["email"].as_text(), Some("ada@example.com"));
    assert_eq!(combined["nickname"].as_text(), Some("ada"));
    assert_eq!(combined["terms"].as_text(), Some("yes"));
    assert_eq!(m.correlation_id(), Some(4242));
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn test_signup_flow_in_memory() {
    run_signup(Arc::new(MemorySessionStore::new()));
}

#[test]
fn test_signup_flow_on_disk() {
    let dir = TempDir::new().unwrap();
    run_signup(Arc::new(FileSessionStore::new(dir.path())));

    let record = dir.path().join("client-1").join("form_step_signup.json");
    assert!(record.exists());
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(json["correlation_id"], 4242);
    assert_eq!(json["current_step"], "confirm");
}

#[test]
fn test_wizards_in_one_session_are_isolated() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let config = Arc::new(FormStepConfig::builder().total_steps(2).build().unwrap());

    let first = StateStore::load(Arc::clone(&store), "client", config.session_key("a")).unwrap();
    let mut a = FormStepManager::new(Arc::clone(&config), first).unwrap();
    a.process(FormRequest::next(StepData::new())).unwrap();

    let second = StateStore::load(Arc::clone(&store), "client", config.session_key("b")).unwrap();
    let b = FormStepManager::new(Arc::clone(&config), second).unwrap();

    assert_eq!(a.current_step(), &StepId::from(2));
    assert_eq!(b.current_step(), &StepId::from(1));
}

#[test]
fn test_commit_on_success_policy() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let config = Arc::new(
        FormStepConfig::builder()
            .steps([1, 2])
            .commit_policy(CommitPolicy::OnSuccess)
            .handler(1, |data: &StepData, _: &mut StateStore| {
                if data.contains_key("ok") {
                    StepOutcome::ok()
                } else {
                    StepOutcome::failed(["missing ok"])
                }
            })
            .build()
            .unwrap(),
    );

    let state = StateStore::load(Arc::clone(&store), "s", config.session_key("f")).unwrap();
    let mut manager = FormStepManager::new(Arc::clone(&config), state).unwrap();
    manager.process(FormRequest::next(step_data([("draft", "x")]))).unwrap();
    assert!(manager.step_data(&StepId::from(1)).is_empty());

    manager.process(FormRequest::next(step_data([("ok", "1")]))).unwrap();
    assert_eq!(manager.step_data(&StepId::from(1))["ok"].as_text(), Some("1"));
    assert_eq!(manager.current_step(), &StepId::from(2));
}

#[test]
fn test_definition_driven_wizard() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("contact.hbs"),
        "<input name=\"email\" value=\"{{data.email}}\">{{#each errors.fields.email}}<span>{{this}}</span>{{/each}}",
    )
    .unwrap();
    let path = dir.path().join("contact.yaml");
    fs::write(
        &path,
        "steps: [contact, message]\nvalidation_rules:\n  contact:\n    email: required|email\nviews:\n  contact:\n    file: contact.hbs\ntitles:\n  contact: Contact details\n",
    )
    .unwrap();

    let wizard = load_definition(Path::new(&path), DEFAULT_SESSION_PREFIX).unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let state = StateStore::load(store, "s", wizard.config.session_key(&wizard.id)).unwrap();
    let mut manager = FormStepManager::new(Arc::clone(&wizard.config), state).unwrap();

    manager.process(FormRequest::next(step_data([("email", "bad")]))).unwrap();
    let html = manager.render().unwrap();
    assert!(html.contains("Contact details"));
    assert!(html.contains("<span>The email field must be a valid email address.</span>"));
}
