use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(json: bool, quiet: bool) -> Self {
        Self { json, quiet }
    }

    /// Print one received value together with its message type.
    pub fn emit_item(&self, kind: i64, value: &Value) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.json {
            let line = serde_json::json!({ "type": kind, "value": value });
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("{}", to_string(value));
        }
        Ok(())
    }

    pub fn emit_status<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let json = serde_json::to_value(value)?;
            self.print_object_as_table("queue", &json);
        }
        Ok(())
    }

    pub fn emit_message(&self, message: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        println!("{}", message.as_ref());
    }

    pub fn emit_kv_rows(&self, title: &str, rows: &[(String, String)]) {
        if self.quiet {
            return;
        }

        if self.json {
            let mut map = Map::new();
            for (k, v) in rows {
                map.insert(k.clone(), Value::String(v.clone()));
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&Value::Object(map)).unwrap_or_else(|_| "{}".into())
            );
            return;
        }

        println!("{title}");
        println!("{}", kv_table(rows));
    }

    fn print_object_as_table(&self, title: &str, value: &Value) {
        match value {
            Value::Object(obj) => {
                let rows = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), to_string(v)))
                    .collect::<Vec<_>>();
                self.emit_kv_rows(title, &rows);
            }
            _ => self.emit_message(to_string(value)),
        }
    }
}

fn kv_table(rows: &[(String, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["field", "value"]);
    for (k, v) in rows {
        table.add_row(vec![Cell::new(k), Cell::new(v)]);
    }
    table
}

fn to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<invalid>".into()),
    }
}
