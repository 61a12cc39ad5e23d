//! Lifecycle wrapper around a native multi-client session.
//!
//! The runtime itself is opaque and reached through [`SessionRuntime`].
//! [`MultiClientSession`] only enforces the CREATED -> INITED -> CLOSED
//! state machine and the config exchange in protobuf text format.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

/// A failed call into the native runtime.
#[derive(Debug, Error)]
#[error("runtime call {call} failed: {message}")]
pub struct RuntimeError {
    pub call: &'static str,
    pub message: String,
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was called in a state that does not allow it. The
    /// session is left unchanged and the caller may retry later.
    #[error(
        "The calling to {operation} is only allowed when status is {allowed}, but current status is {actual}"
    )]
    InvalidStatus {
        operation: &'static str,
        allowed: String,
        actual: SessionStatus,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Created,
    Inited,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Inited => "INITED",
            SessionStatus::Closed => "CLOSED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub id: i64,
}

/// Scalar value of a text-format field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Str(v) => {
                f.write_str("\"")?;
                for c in v.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Resource section of the session config (device counts, ports, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceConfig {
    pub fields: BTreeMap<String, FieldValue>,
}

impl ResourceConfig {
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    fn write_fields(&self, out: &mut String, indent: &str) {
        for (name, value) in &self.fields {
            out.push_str(&format!("{}{}: {}\n", indent, name, value));
        }
    }

    /// Text format of the resource message on its own.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_fields(&mut out, "");
        out
    }
}

/// Session config handed to the runtime on init.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigProto {
    pub session_id: i64,
    pub resource: ResourceConfig,
}

impl ConfigProto {
    pub fn new(session_id: i64) -> Self {
        Self {
            session_id,
            resource: ResourceConfig::default(),
        }
    }

    /// Protobuf text format. `resource` is always present, even when empty.
    pub fn to_text(&self) -> String {
        let mut out = String::from("resource {\n");
        self.resource.write_fields(&mut out, "  ");
        out.push_str("}\n");
        out.push_str(&format!("session_id: {}\n", self.session_id));
        out
    }
}

/// Attribute name -> default value, as reported by the runtime.
pub type AttrDefaults = BTreeMap<String, FieldValue>;

/// One-shot, side-effecting calls into the native runtime.
pub trait SessionRuntime {
    type Graph;

    fn register_session(&mut self, id: i64) -> RuntimeResult<SessionHandle>;
    fn create_context(&mut self) -> RuntimeResult<()>;
    fn init_context(&mut self, config_text: &str) -> RuntimeResult<()>;
    fn destroy_context(&mut self) -> RuntimeResult<()>;
    fn clear_session(&mut self, id: i64) -> RuntimeResult<()>;
    fn add_graph(&mut self, handle: SessionHandle, graph: Self::Graph) -> RuntimeResult<()>;
    fn update_resource(&mut self, config_text: &str) -> RuntimeResult<()>;
    fn current_resource(&self) -> RuntimeResult<ResourceConfig>;
    fn function_config_defaults(&self) -> RuntimeResult<AttrDefaults>;
    fn scope_config_defaults(&self) -> RuntimeResult<AttrDefaults>;
}

pub struct MultiClientSession<R: SessionRuntime> {
    runtime: R,
    handle: SessionHandle,
    status: SessionStatus,
    config: ConfigProto,
    function_defaults: AttrDefaults,
    scope_defaults: AttrDefaults,
}

impl<R: SessionRuntime> MultiClientSession<R> {
    /// Register the session and create its context. The session starts in
    /// CREATED.
    pub fn new(mut runtime: R, session_id: i64) -> Result<Self, SessionError> {
        let handle = runtime.register_session(session_id)?;
        runtime.create_context()?;
        let function_defaults = runtime.function_config_defaults()?;
        let scope_defaults = runtime.scope_config_defaults()?;
        info!(session_id = handle.id, "session created");
        Ok(Self {
            runtime,
            handle,
            status: SessionStatus::Created,
            config: ConfigProto::new(handle.id),
            function_defaults,
            scope_defaults,
        })
    }

    pub fn id(&self) -> i64 {
        self.handle.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Inited
    }

    pub fn config_proto(&self) -> &ConfigProto {
        &self.config
    }

    /// Adjust the config before [`try_init`](Self::try_init) sends it.
    pub fn config_proto_mut(&mut self) -> &mut ConfigProto {
        &mut self.config
    }

    pub fn function_flag_defaults(&self) -> &AttrDefaults {
        &self.function_defaults
    }

    pub fn scope_attr_defaults(&self) -> &AttrDefaults {
        &self.scope_defaults
    }

    /// Initialize the context once; a second call is a no-op.
    pub fn try_init(&mut self) -> Result<(), SessionError> {
        self.check_status("try_init", &[SessionStatus::Created, SessionStatus::Inited])?;
        if self.status == SessionStatus::Created {
            self.runtime.init_context(&self.config.to_text())?;
            self.status = SessionStatus::Inited;
            debug!(session_id = self.handle.id, "session initialized");
        }
        Ok(())
    }

    pub fn add_graph(&mut self, graph: R::Graph) -> Result<(), SessionError> {
        self.check_status("add_graph", &[SessionStatus::Inited])?;
        self.runtime.add_graph(self.handle, graph)?;
        Ok(())
    }

    pub fn resource(&self) -> Result<ResourceConfig, SessionError> {
        self.check_status("resource", &[SessionStatus::Inited])?;
        Ok(self.runtime.current_resource()?)
    }

    pub fn update_resource_eagerly(&mut self, resource: &ResourceConfig) -> Result<(), SessionError> {
        self.check_status("update_resource_eagerly", &[SessionStatus::Inited])?;
        self.runtime.update_resource(&resource.to_text())?;
        Ok(())
    }

    /// Destroy the context and clear the session. Idempotent; the session
    /// is CLOSED afterwards even if the runtime reports a failure.
    pub fn try_close(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Closed {
            return Ok(());
        }
        self.status = SessionStatus::Closed;
        self.runtime.destroy_context()?;
        self.runtime.clear_session(self.handle.id)?;
        info!(session_id = self.handle.id, "session closed");
        Ok(())
    }

    fn check_status(&self, operation: &'static str, allowed: &[SessionStatus]) -> Result<(), SessionError> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(SessionError::InvalidStatus {
            operation,
            allowed: allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            actual: self.status,
        })
    }
}

impl<R: SessionRuntime> Drop for MultiClientSession<R> {
    fn drop(&mut self) {
        if let Err(e) = self.try_close() {
            warn!(session_id = self.handle.id, error = %e, "failed to close session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct MockRuntime {
        calls: Rc<RefCell<Vec<String>>>,
        fail_destroy: bool,
    }

    impl MockRuntime {
        fn log(&self, call: impl Into<String>) {
            self.calls.borrow_mut().push(call.into());
        }
    }

    impl SessionRuntime for MockRuntime {
        type Graph = &'static str;

        fn register_session(&mut self, id: i64) -> RuntimeResult<SessionHandle> {
            self.log(format!("register {}", id));
            Ok(SessionHandle { id })
        }
        fn create_context(&mut self) -> RuntimeResult<()> {
            self.log("create");
            Ok(())
        }
        fn init_context(&mut self, config_text: &str) -> RuntimeResult<()> {
            self.log(format!("init {}", config_text));
            Ok(())
        }
        fn destroy_context(&mut self) -> RuntimeResult<()> {
            self.log("destroy");
            if self.fail_destroy {
                return Err(RuntimeError {
                    call: "destroy_context",
                    message: "busy".to_string(),
                });
            }
            Ok(())
        }
        fn clear_session(&mut self, id: i64) -> RuntimeResult<()> {
            self.log(format!("clear {}", id));
            Ok(())
        }
        fn add_graph(&mut self, handle: SessionHandle, graph: Self::Graph) -> RuntimeResult<()> {
            self.log(format!("graph {} {}", handle.id, graph));
            Ok(())
        }
        fn update_resource(&mut self, config_text: &str) -> RuntimeResult<()> {
            self.log(format!("update {}", config_text.trim_end()));
            Ok(())
        }
        fn current_resource(&self) -> RuntimeResult<ResourceConfig> {
            let mut resource = ResourceConfig::default();
            resource.set("machine_num", FieldValue::Int(1));
            Ok(resource)
        }
        fn function_config_defaults(&self) -> RuntimeResult<AttrDefaults> {
            Ok(AttrDefaults::from([(
                "default_data_type".to_string(),
                FieldValue::Int(2),
            )]))
        }
        fn scope_config_defaults(&self) -> RuntimeResult<AttrDefaults> {
            Ok(AttrDefaults::new())
        }
    }

    fn session() -> (MultiClientSession<MockRuntime>, Rc<RefCell<Vec<String>>>) {
        let runtime = MockRuntime::default();
        let calls = Rc::clone(&runtime.calls);
        (MultiClientSession::new(runtime, 7).unwrap(), calls)
    }

    #[test]
    fn lifecycle() {
        let (mut sess, calls) = session();
        assert_eq!(sess.status(), SessionStatus::Created);
        assert!(!sess.is_running());
        assert_eq!(sess.function_flag_defaults().len(), 1);

        sess.config_proto_mut()
            .resource
            .set("gpu_device_num", FieldValue::Int(8));
        sess.try_init().unwrap();
        sess.try_init().unwrap();
        assert!(sess.is_running());
        sess.add_graph("g0").unwrap();
        assert_eq!(
            sess.resource().unwrap().fields.get("machine_num"),
            Some(&FieldValue::Int(1))
        );

        sess.try_close().unwrap();
        sess.try_close().unwrap();
        drop(sess);

        assert_eq!(
            *calls.borrow(),
            [
                "register 7",
                "create",
                "init resource {\n  gpu_device_num: 8\n}\nsession_id: 7\n",
                "graph 7 g0",
                "destroy",
                "clear 7",
            ]
        );
    }

    #[test]
    fn wrong_state_is_rejected_without_change() {
        let (mut sess, calls) = session();
        let err = sess.add_graph("g0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The calling to add_graph is only allowed when status is INITED, but current status is CREATED"
        );
        assert_eq!(sess.status(), SessionStatus::Created);

        sess.try_close().unwrap();
        let err = sess.try_init().unwrap_err();
        assert_eq!(
            err.to_string(),
            "The calling to try_init is only allowed when status is CREATED or INITED, but current status is CLOSED"
        );
        assert!(!calls.borrow().iter().any(|c| c.starts_with("init")));
    }

    #[test]
    fn drop_closes_once() {
        let (mut sess, calls) = session();
        sess.try_init().unwrap();
        sess.update_resource_eagerly(ResourceConfig::default().set("machine_num", FieldValue::Int(2)))
            .unwrap();
        drop(sess);
        let calls = calls.borrow();
        assert_eq!(calls.iter().filter(|c| *c == "destroy").count(), 1);
        assert!(calls.contains(&"update machine_num: 2".to_string()));
    }

    #[test]
    fn failed_close_still_closes() {
        let runtime = MockRuntime {
            fail_destroy: true,
            ..MockRuntime::default()
        };
        let calls = Rc::clone(&runtime.calls);
        let mut sess = MultiClientSession::new(runtime, 1).unwrap();
        assert!(matches!(sess.try_close(), Err(SessionError::Runtime(_))));
        assert_eq!(sess.status(), SessionStatus::Closed);
        drop(sess);
        assert_eq!(calls.borrow().iter().filter(|c| *c == "destroy").count(), 1);
    }

    #[test]
    fn text_format_quotes_strings() {
        let mut config = ConfigProto::new(3);
        config
            .resource
            .set("collective_boxing", FieldValue::Bool(true))
            .set("name", FieldValue::Str("a\"b".into()));
        assert_eq!(
            config.to_text(),
            "resource {\n  collective_boxing: true\n  name: \"a\\\"b\"\n}\nsession_id: 3\n"
        );
    }
}
