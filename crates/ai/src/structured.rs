use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use stratamem_shared::{MemoryError, Result};

use crate::ports::TextModel;

/// Ask the model for a single JSON object matching `T`'s schema.
///
/// The schema constrains the call through [`TextModel::complete_schema`]:
/// OpenAI-compatible backends enforce it with strict-mode
/// `response_format`, others receive it in the prompt. A reply that still
/// fails to parse is a [`MemoryError::Parse`]; callers fall back to their
/// heuristic path.
pub async fn complete_structured<T>(
  model: &dyn TextModel,
  system: &str,
  user: &str,
  schema_name: &str,
) -> Result<T>
where
  T: DeserializeOwned + JsonSchema,
{
  let schema = serde_json::to_value(schemars::schema_for!(T))
    .map_err(|e| MemoryError::Parse(e.to_string()))?;

  let reply = model.complete_schema(system, user, schema_name, schema).await?;
  extract_json(&reply)
}

/// Rewrite a schemars-generated schema for OpenAI strict mode:
/// `additionalProperties: false` on every object, `required` covering all
/// property keys, no `oneOf`/`anyOf`, and `$ref` standing alone.
pub(crate) fn fix_schema_for_strict(schema: &mut serde_json::Value) {
  let Some(obj) = schema.as_object_mut() else {
    return;
  };

  // Strict mode requires $ref to be the only key.
  if obj.contains_key("$ref") {
    obj.retain(|k, _| k == "$ref");
    return;
  }

  // oneOf of const strings becomes a plain enum.
  if let Some(one_of) = obj.get("oneOf").and_then(|v| v.as_array()).cloned() {
    let consts: Option<Vec<serde_json::Value>> =
      one_of.iter().map(|v| v.get("const").cloned()).collect();
    if let Some(values) = consts {
      obj.clear();
      obj.insert("type".to_owned(), serde_json::Value::String("string".to_owned()));
      obj.insert("enum".to_owned(), serde_json::Value::Array(values));
      return;
    }
  }

  // anyOf of [T, null] (the Option<T> encoding) unwraps to T.
  if let Some(any_of) = obj.get("anyOf").and_then(|v| v.as_array()).cloned() {
    let non_null: Vec<&serde_json::Value> = any_of
      .iter()
      .filter(|v| v.get("type").and_then(|t| t.as_str()) != Some("null"))
      .collect();
    if non_null.len() == 1 {
      let inner = non_null[0].clone();
      obj.clear();
      obj.extend(inner.as_object().cloned().unwrap_or_default());
      fix_schema_for_strict(schema);
      return;
    }
  }

  if obj.contains_key("properties") {
    let keys: Vec<serde_json::Value> = obj["properties"]
      .as_object()
      .map(|p| p.keys().map(|k| serde_json::Value::String(k.clone())).collect())
      .unwrap_or_default();
    obj.insert("required".to_owned(), serde_json::Value::Array(keys));
    obj.insert("additionalProperties".to_owned(), serde_json::Value::Bool(false));

    if let Some(props) = obj.get_mut("properties").and_then(|p| p.as_object_mut()) {
      for v in props.values_mut() {
        fix_schema_for_strict(v);
      }
    }
  }

  if let Some(items) = obj.get_mut("items") {
    fix_schema_for_strict(items);
  }

  // schemars 0.x nests under "definitions", 1.x under "$defs".
  for defs_key in ["definitions", "$defs"] {
    if let Some(defs) = obj.get_mut(defs_key).and_then(|d| d.as_object_mut()) {
      for v in defs.values_mut() {
        fix_schema_for_strict(v);
      }
    }
  }
}

/// Parse the first balanced JSON object out of free-form model output.
/// Tolerates code fences and leading/trailing prose.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
  let Some(start) = text.find('{') else {
    return Err(MemoryError::Parse(format!("no JSON object in: {}", preview(text))));
  };

  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (offset, c) in text[start..].char_indices() {
    if in_string {
      match c {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          let candidate = &text[start..=start + offset];
          return serde_json::from_str(candidate)
            .map_err(|e| MemoryError::Parse(format!("{e}: {}", preview(candidate))));
        }
      }
      _ => {}
    }
  }

  Err(MemoryError::Parse(format!("unbalanced JSON object in: {}", preview(text))))
}

fn preview(text: &str) -> String {
  text.chars().take(80).collect()
}
