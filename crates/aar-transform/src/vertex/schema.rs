use serde_json::{Map, Value as JsonValue};

/// Rewrite a JSON Schema tree into the subset Gemini accepts.
///
/// `$ref`/`$defs` are inlined (the API has no reference resolution) and
/// OpenAI-only keywords are dropped. Returns a new tree; the input is not
/// mutated.
pub fn sanitize_schema(schema: &JsonValue) -> JsonValue {
    let defs = collect_defs(schema);
    let mut in_flight = Vec::new();
    sanitize_node(schema, &defs, &mut in_flight)
}

const DROPPED_KEYS: [&str; 6] = [
    "$defs",
    "definitions",
    "$schema",
    "$id",
    "additionalProperties",
    "strict",
];

fn collect_defs(root: &JsonValue) -> Map<String, JsonValue> {
    let mut defs = Map::new();
    if let JsonValue::Object(map) = root {
        for key in ["$defs", "definitions"] {
            if let Some(JsonValue::Object(entries)) = map.get(key) {
                for (name, def) in entries {
                    defs.insert(format!("#/{key}/{name}"), def.clone());
                }
            }
        }
    }
    defs
}

fn sanitize_node(
    node: &JsonValue,
    defs: &Map<String, JsonValue>,
    in_flight: &mut Vec<String>,
) -> JsonValue {
    match node {
        JsonValue::Object(map) => {
            if let Some(JsonValue::String(reference)) = map.get("$ref") {
                return resolve_ref(reference, defs, in_flight);
            }
            let mut out = Map::new();
            for (key, value) in map {
                if DROPPED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), sanitize_node(value, defs, in_flight));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| sanitize_node(item, defs, in_flight))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_ref(
    reference: &str,
    defs: &Map<String, JsonValue>,
    in_flight: &mut Vec<String>,
) -> JsonValue {
    // A cycle cannot be inlined; degrade to an untyped object node.
    if in_flight.iter().any(|seen| seen == reference) {
        return serde_json::json!({"type": "object"});
    }
    let Some(definition) = defs.get(reference) else {
        return serde_json::json!({"type": "object"});
    };
    in_flight.push(reference.to_string());
    let resolved = sanitize_node(definition, defs, in_flight);
    in_flight.pop();
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_openai_only_keywords() {
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "strict": true,
            "properties": {
                "city": {"type": "string", "additionalProperties": false}
            },
            "required": ["city"]
        });
        let out = sanitize_schema(&schema);
        assert!(out.get("additionalProperties").is_none());
        assert!(out.get("strict").is_none());
        assert!(out["properties"]["city"].get("additionalProperties").is_none());
        assert_eq!(out["required"][0], "city");
    }

    #[test]
    fn inlines_refs_from_defs() {
        let schema = json!({
            "type": "object",
            "properties": {
                "address": {"$ref": "#/$defs/Address"}
            },
            "$defs": {
                "Address": {
                    "type": "object",
                    "properties": {"street": {"type": "string"}},
                    "additionalProperties": false
                }
            }
        });
        let out = sanitize_schema(&schema);
        assert!(out.get("$defs").is_none());
        assert_eq!(out["properties"]["address"]["type"], "object");
        assert_eq!(
            out["properties"]["address"]["properties"]["street"]["type"],
            "string"
        );
        assert!(out["properties"]["address"].get("additionalProperties").is_none());
    }

    #[test]
    fn nested_refs_resolve() {
        let schema = json!({
            "type": "object",
            "properties": {"person": {"$ref": "#/$defs/Person"}},
            "$defs": {
                "Person": {
                    "type": "object",
                    "properties": {"home": {"$ref": "#/$defs/Address"}}
                },
                "Address": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        });
        let out = sanitize_schema(&schema);
        assert_eq!(
            out["properties"]["person"]["properties"]["home"]["properties"]["city"]["type"],
            "string"
        );
    }

    #[test]
    fn cyclic_refs_degrade_instead_of_looping() {
        let schema = json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/Node"}},
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/$defs/Node"}}
                }
            }
        });
        let out = sanitize_schema(&schema);
        assert_eq!(out["properties"]["node"]["properties"]["next"]["type"], "object");
    }

    #[test]
    fn unknown_ref_degrades_to_object() {
        let schema = json!({"$ref": "#/$defs/Missing"});
        let out = sanitize_schema(&schema);
        assert_eq!(out["type"], "object");
    }
}
