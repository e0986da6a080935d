//! Reading ad pods out of the ad server's JSON handshake.
//!
//! The payload looks like `{"aeg": [[item, item], [item]]}`: an array of
//! groups, each an array of item records.

use crate::error::{Result, VastError};
use crate::item::{Group, Item, MetaInfo, Source};
use log::debug;
use serde_json::{Map, Value};
use url::Url;

/// Top-level key holding the ad groups
pub const GROUPS_KEY: &str = "aeg";

pub type RawItem = Map<String, Value>;

/// Extract the raw item records of every group.
///
/// A missing key or a container of the wrong type is an error; empty groups
/// are returned as they are.
pub fn parse_groups(json: &Value) -> Result<Vec<Vec<RawItem>>> {
    let groups = json
        .get(GROUPS_KEY)
        .ok_or_else(|| VastError::InvalidPayload(format!("missing `{}` key", GROUPS_KEY)))?
        .as_array()
        .ok_or_else(|| VastError::InvalidPayload(format!("`{}` is not an array", GROUPS_KEY)))?;

    groups
        .iter()
        .map(|group| -> Result<Vec<RawItem>> {
            group
                .as_array()
                .ok_or_else(|| VastError::InvalidPayload("group is not an array".to_string()))?
                .iter()
                .map(|item| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| VastError::InvalidPayload("item is not an object".to_string()))
                })
                .collect()
        })
        .collect()
}

pub fn parse_url(json: &RawItem) -> Result<Url> {
    let url = string_field(json, "url").ok_or_else(|| VastError::MissingField("url".to_string()))?;
    Ok(Url::parse(url)?)
}

pub fn parse_vast_xml(json: &RawItem) -> Result<String> {
    string_field(json, "vastXml")
        .map(str::to_string)
        .ok_or_else(|| VastError::MissingField("vastXml".to_string()))
}

/// Build an item from its record. `vastXml` wins over `url` when both are present.
pub fn parse_item(json: &RawItem) -> Result<Item> {
    let source = if let Ok(xml) = parse_vast_xml(json) {
        Source::Vast(xml)
    } else if json.contains_key("url") {
        Source::Url(parse_url(json)?)
    } else {
        return Err(VastError::InvalidPayload("item has neither `vastXml` nor `url`".to_string()));
    };

    Ok(Item::new(source, parse_meta_info(json)))
}

fn parse_meta_info(json: &RawItem) -> MetaInfo {
    let text = |key: &str| -> Option<String> {
        match json.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    MetaInfo {
        engine_type: text("engineType"),
        rule_id: text("ruleId"),
        rule_company_id: text("ruleCompanyId"),
        vendor: text("vendor"),
        name: text("name"),
        cpm: text("cpm"),
    }
}

fn string_field<'a>(json: &'a RawItem, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Value::as_str)
}

/// Parse a handshake payload into the groups to resolve, in order
pub fn parse_pod_response(payload: &str) -> Result<Vec<Group>> {
    let json: Value = serde_json::from_str(payload)?;
    let mut groups = Vec::new();

    for raw_group in parse_groups(&json)? {
        if raw_group.is_empty() {
            debug!("Skipping empty ad group");
            continue;
        }
        let items = raw_group.iter().map(parse_item).collect::<Result<Vec<_>>>()?;
        groups.push(Group::new(items)?);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawItem {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_empty_groups() {
        assert_eq!(parse_groups(&json!({"aeg": []})).unwrap().len(), 0);

        let groups = parse_groups(&json!({"aeg": [[]]})).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
    }

    #[test]
    fn parses_multiple_groups() {
        let group1 = json!([{"A": "test"}, {"B": "test2"}]);
        let group2 = json!([{"1": "test"}, {"2": "test2"}]);

        let groups = parse_groups(&json!({"aeg": [group1.clone(), group2.clone()]})).unwrap();

        let as_values: Vec<Value> = groups
            .into_iter()
            .map(|group| Value::Array(group.into_iter().map(Value::Object).collect()))
            .collect();
        assert_eq!(as_values, vec![group1, group2]);
    }

    #[test]
    fn rejects_missing_key() {
        assert!(matches!(
            parse_groups(&json!({"aeg2": [[]]})),
            Err(VastError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_plain_array_of_items() {
        assert!(matches!(
            parse_groups(&json!({"aeg": [{"A": "test"}, {"B": "test2"}]})),
            Err(VastError::InvalidPayload(_))
        ));
    }

    #[test]
    fn extracts_url_and_vast() {
        assert_eq!(
            parse_url(&raw(json!({"url": "http://test.com"}))).unwrap().as_str(),
            "http://test.com/"
        );
        assert_eq!(parse_vast_xml(&raw(json!({"vastXml": "vast"}))).unwrap(), "vast");
    }

    #[test]
    fn parses_items() {
        let item = parse_item(&raw(json!({"vastXml": "vast", "vendor": "vendor"}))).unwrap();
        assert_eq!(item.source, Source::Vast("vast".to_string()));
        assert_eq!(item.meta_info.vendor.as_deref(), Some("vendor"));

        let item = parse_item(&raw(json!({"url": "http://test.com", "vendor": "vendor"}))).unwrap();
        assert!(matches!(item.source, Source::Url(ref url) if url.as_str() == "http://test.com/"));

        assert!(parse_item(&raw(json!({}))).is_err());
    }

    #[test]
    fn prefers_vast_over_url() {
        let item = parse_item(&raw(json!({
            "vastXml": "vast",
            "url": "http://test.com",
            "vendor": "vendor"
        })))
        .unwrap();
        assert_eq!(item.source, Source::Vast("vast".to_string()));
    }

    #[test]
    fn numeric_cpm_is_kept_as_text() {
        let item = parse_item(&raw(json!({"url": "http://test.com", "cpm": 2.5, "ruleId": "r1"}))).unwrap();
        assert_eq!(item.meta_info.cpm.as_deref(), Some("2.5"));
        assert_eq!(item.meta_info.rule_id.as_deref(), Some("r1"));
    }

    #[test]
    fn pod_response_skips_empty_groups() {
        let payload = r#"{"aeg": [[], [{"vastXml": "<VAST/>", "vendor": "v"}, {"url": "http://a.com"}]]}"#;
        let groups = parse_pod_response(payload).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].items().len(), 2);
    }
}
