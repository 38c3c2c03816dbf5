//! Actions of the internal pseudo-connection, executed by the engine itself

use serde_json::Value;
use tracing::{debug, warn};

use crate::host::RunActionExtras;
use crate::model::{ActionInstance, ControlId, ControlLocation};

fn option_u32(action: &ActionInstance, key: &str) -> Option<u32> {
    match action.options.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn option_bool(action: &ActionInstance, key: &str) -> bool {
    action.options.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// How `trigger_enabled` should change the flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnableMode {
    Set(bool),
    Toggle,
}

fn enable_mode(action: &ActionInstance) -> Option<EnableMode> {
    match action.options.get("enable")? {
        Value::Bool(b) => Some(EnableMode::Set(*b)),
        Value::String(s) if s == "toggle" => Some(EnableMode::Toggle),
        Value::String(s) => s.parse().ok().map(EnableMode::Set),
        _ => None,
    }
}

impl super::Controller {
    /// Grid target of a button action; page 0 means the page of the origin
    fn internal_target(&self, action: &ActionInstance, extras: &RunActionExtras) -> Option<ControlId> {
        let page = match option_u32(action, "page").unwrap_or(0) {
            0 => extras.location.map(|l| l.page)?,
            page => page,
        };
        let location = ControlLocation::new(
            page,
            option_u32(action, "row")?,
            option_u32(action, "column")?,
        );
        self.services.resolver.get_control_id_at(&location)
    }

    fn internal_surface(action: &ActionInstance, extras: &RunActionExtras) -> Option<String> {
        action
            .options
            .get("surface")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| extras.surface_id.clone())
    }

    /// Execute one internal action queued by the runner
    pub(crate) fn run_internal(&mut self, action: &ActionInstance, extras: &RunActionExtras) {
        // Presses carry the originating control as their surface
        let origin = extras.control_id.as_str().to_string();
        let result = match action.definition_id.as_str() {
            "button_pressrelease" => self.internal_target(action, extras).map(|target| {
                self.press_inner(&target, true, Some(&origin), false)
                    .and_then(|_| self.press_inner(&target, false, Some(&origin), false))
            }),
            "button_press" => self
                .internal_target(action, extras)
                .map(|target| self.press_inner(&target, true, Some(&origin), false)),
            "button_release" => self
                .internal_target(action, extras)
                .map(|target| self.press_inner(&target, false, Some(&origin), false)),
            "button_rotate" => self.internal_target(action, extras).map(|target| {
                let clockwise = action.options.get("direction").and_then(Value::as_str) != Some("left");
                self.rotate_inner(&target, clockwise, Some(&origin))
            }),
            "set_page" | "inc_page" | "dec_page" => {
                let Some(surface) = Self::internal_surface(action, extras) else {
                    debug!("{} without a surface ignored", action.definition_id);
                    return;
                };
                let navigator = &self.services.navigator;
                match action.definition_id.as_str() {
                    "inc_page" => navigator.device_page_up(&surface),
                    "dec_page" => navigator.device_page_down(&surface),
                    _ => match option_u32(action, "page") {
                        Some(page) => navigator.device_page_set(&surface, page),
                        None => debug!("set_page without a page ignored"),
                    },
                }
                return;
            }
            "panic" => {
                self.abort_all_delayed();
                return;
            }
            "panic_bank" => self.internal_target(action, extras).map(|target| {
                self.abort_control_delayed(&target, option_bool(action, "unlatch"));
                Ok(true)
            }),
            "bank_current_step" => self.internal_target(action, extras).map(|target| {
                let step = option_u32(action, "step")
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|index| {
                        self.controls
                            .get(&target)?
                            .as_steps()?
                            .step_ids()
                            .get(index as usize)
                            .copied()
                    });
                match step {
                    Some(step) => self.step_select(&target, step),
                    None => Ok(false),
                }
            }),
            "trigger_enabled" => {
                let Some(raw) = action.options.get("trigger_id").and_then(Value::as_str) else {
                    debug!("trigger_enabled without a trigger_id ignored");
                    return;
                };
                let trigger_id = if ControlId::str_is_trigger(raw) {
                    ControlId::new(raw)
                } else {
                    ControlId::for_trigger(raw)
                };
                let current = self
                    .controls
                    .get(&trigger_id)
                    .and_then(|c| c.as_trigger())
                    .map(|t| t.enabled());
                match (current, enable_mode(action)) {
                    (Some(current), Some(mode)) => {
                        let enabled = match mode {
                            EnableMode::Set(b) => b,
                            EnableMode::Toggle => !current,
                        };
                        Some(self.trigger_set_enabled(&trigger_id, enabled))
                    }
                    _ => None,
                }
            }
            other => {
                debug!("Unknown internal action '{}'", other);
                return;
            }
        };

        match result {
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!("Internal action {} failed: {}", action.definition_id, e),
            None => debug!(
                "Internal action {} from {} has no valid target",
                action.definition_id, extras.control_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_parsing() {
        let a = ActionInstance::new("a", "internal", "button_press")
            .with_option("row", json!("2"))
            .with_option("column", json!(3))
            .with_option("enable", json!("toggle"));
        assert_eq!(option_u32(&a, "row"), Some(2));
        assert_eq!(option_u32(&a, "column"), Some(3));
        assert_eq!(option_u32(&a, "page"), None);
        assert_eq!(enable_mode(&a), Some(EnableMode::Toggle));

        let b = a.with_option("enable", json!("false"));
        assert_eq!(enable_mode(&b), Some(EnableMode::Set(false)));
    }
}
