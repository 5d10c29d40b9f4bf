//! Advisory events emitted by the trigger engine

use crate::trigger::TriggerKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Structured facts handed to the text generator
pub type EventContext = Map<String, Value>;

/// One advisory raised for one competitor. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryEvent {
    kind: TriggerKind,
    car_index: u8,
    account_id: Option<String>,
    context: EventContext,
    priority: u8,
    created_at: DateTime<Utc>,
}

impl AdvisoryEvent {
    pub fn new(
        kind: TriggerKind,
        car_index: u8,
        account_id: Option<String>,
        context: EventContext,
    ) -> Self {
        Self {
            kind,
            car_index,
            account_id,
            context,
            priority: kind.priority(),
            created_at: Utc::now(),
        }
    }

    /// Replace the table priority before the event is handed off
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn car_index(&self) -> u8 {
        self.car_index
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Full brief for the text generator: trigger name, flattened state and
    /// the kind's template with placeholders filled in.
    pub fn prompt(&self) -> String {
        let mut brief = format!("Trigger: {}\nCurrent race state:\n", self.kind.name());
        for (key, value) in &self.context {
            match value {
                Value::Object(inner) => {
                    brief.push_str(&format!("  {}:\n", key));
                    for (sub_key, sub_value) in inner {
                        brief.push_str(&format!("    {}: {}\n", sub_key, plain(sub_value)));
                    }
                }
                other => brief.push_str(&format!("  {}: {}\n", key, plain(other))),
            }
        }
        brief.push_str("\nTask: ");
        brief.push_str(&render_template(self.kind.prompt_template(), &self.context));
        brief
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{key}` placeholders from `context`. Unknown keys are left as-is.
pub fn render_template(template: &str, context: &EventContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match context.get(key) {
                    Some(value) => out.push_str(&plain(value)),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, Value)]) -> EventContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_default_priority_from_table() {
        let event = AdvisoryEvent::new(TriggerKind::FuelLow, 0, None, EventContext::new());
        assert_eq!(event.priority(), 14);
        assert_eq!(event.with_priority(3).priority(), 3);
    }

    #[test]
    fn test_render_template_fills_known_keys() {
        let context = ctx(&[("position", json!(4)), ("driver", json!("Lando"))]);
        assert_eq!(
            render_template("P{position} for {driver}, gap {gap}", &context),
            "P4 for Lando, gap {gap}"
        );
    }

    #[test]
    fn test_render_template_unclosed_brace() {
        let context = EventContext::new();
        assert_eq!(render_template("oops {open", &context), "oops {open");
    }

    #[test]
    fn test_prompt_contains_trigger_and_task() {
        let context = ctx(&[("fuel_remaining_laps", json!(1.8))]);
        let event = AdvisoryEvent::new(TriggerKind::FuelLow, 0, None, context);
        let prompt = event.prompt();
        assert!(prompt.starts_with("Trigger: FUEL_LOW"));
        assert!(prompt.contains("Fuel for 1.8 laps remaining"));
    }
}
