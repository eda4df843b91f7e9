use serde_json::{Map, Value};

/// Pulls typed fields out of a loosely shaped JSON record, substituting
/// defaults instead of failing. Fields that are present but unusable are
/// remembered so callers can report them.
pub struct FieldReader {
    fields: Map<String, Value>,
    invalid: Vec<&'static str>,
}

impl FieldReader {
    pub fn new(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                fields,
                invalid: Vec::new(),
            },
            _ => Self {
                fields: Map::new(),
                invalid: vec!["<record>"],
            },
        }
    }

    pub fn string(&mut self, key: &'static str) -> String {
        match self.fields.remove(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                self.invalid.push(key);
                String::new()
            }
        }
    }

    pub fn port(&mut self, key: &'static str) -> u16 {
        let port = match self.fields.remove(key) {
            None | Some(Value::Null) => return 0,
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
            Some(_) => None,
        };

        port.unwrap_or_else(|| {
            self.invalid.push(key);
            0
        })
    }

    pub fn discard(&mut self, key: &str) {
        self.fields.remove(key);
    }

    /// Returns the fields that were never read, plus the names of fields
    /// that had to be defaulted.
    pub fn finish(self) -> (Map<String, Value>, Vec<&'static str>) {
        (self.fields, self.invalid)
    }
}

/// Joins at most `limit` items, appending an ellipsis when truncated.
pub fn sample_join<S: AsRef<str>>(items: &[S], limit: usize) -> String {
    let shown: Vec<&str> = items.iter().take(limit).map(|s| s.as_ref()).collect();
    let mut joined = shown.join(", ");
    if items.len() > limit {
        joined.push_str(", ...");
    }
    joined
}

pub fn expand_endpoint(template: &str, address: &str) -> String {
    template.replace("{ip}", address)
}
