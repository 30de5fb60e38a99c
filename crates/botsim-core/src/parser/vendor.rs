//! Vendor bundle ingestion (spec §1 "vendor-specific metadata formats... only the abstract
//! data they yield is specified", §9 supplement): turns a platform-specific export into the
//! platform-neutral [`RawBundle`].
//!
//! Two shapes are supported, matching the two example platforms this system was built
//! against: an XML dialog-flow export (Platform A-style "BotBuilder" bundles) and a JSON
//! page-graph export (Platform B-style "Dialogflow CX"-style bundles).

use quick_xml::de::from_str as xml_from_str;
use serde::Deserialize;

use super::raw::{RawBundle, RawDialog, RawEntityDef, RawIntent, RawStep};
use crate::error::ConfigError;

// ---- BotBuilder-style XML bundle ----

#[derive(Debug, Deserialize)]
#[serde(rename = "bundle")]
struct XmlBundle {
    #[serde(rename = "dialog", default)]
    dialogs: Vec<XmlDialog>,
    #[serde(rename = "intent", default)]
    intents: Vec<XmlIntent>,
    #[serde(rename = "entity", default)]
    entities: Vec<XmlEntity>,
}

#[derive(Debug, Deserialize)]
struct XmlDialog {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "step", default)]
    steps: Vec<XmlStep>,
}

#[derive(Debug, Deserialize)]
struct XmlStep {
    #[serde(rename = "@type")]
    step_type: String,
    #[serde(rename = "@slot", default)]
    slot: Option<String>,
    #[serde(rename = "@entity", default)]
    entity: Option<String>,
    #[serde(rename = "@target", default)]
    target: Option<String>,
    #[serde(rename = "@expression", default)]
    expression: Option<String>,
    #[serde(rename = "text", default)]
    text: Option<String>,
    #[serde(rename = "retry", default)]
    retries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct XmlIntent {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "utterance", default)]
    utterances: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct XmlEntity {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@kind")]
    kind: String,
    #[serde(rename = "value", default)]
    values: Vec<String>,
    #[serde(rename = "pattern", default)]
    pattern: Option<String>,
}

/// Parses a BotBuilder-style XML bundle into a [`RawBundle`] (spec §4.C step 1).
pub fn parse_botbuilder_bundle(xml: &str) -> Result<RawBundle, ConfigError> {
    let parsed: XmlBundle = xml_from_str(xml).map_err(|source| ConfigError::Invalid(format!("malformed XML bundle: {source}")))?;

    let dialogs = parsed
        .dialogs
        .into_iter()
        .map(|d| RawDialog {
            name: d.name,
            steps: d.steps.into_iter().filter_map(xml_step_to_raw_step).collect(),
        })
        .collect();

    let intents = parsed
        .intents
        .into_iter()
        .map(|i| RawIntent {
            name: i.name,
            training_utterances: i.utterances,
        })
        .collect();

    let entities = parsed
        .entities
        .into_iter()
        .map(|e| match e.kind.as_str() {
            "regex" => RawEntityDef::Regex {
                name: e.name,
                pattern: e.pattern.unwrap_or_default(),
            },
            _ => RawEntityDef::ValueList {
                name: e.name,
                values: e.values,
            },
        })
        .collect();

    Ok(RawBundle { dialogs, intents, entities })
}

fn xml_step_to_raw_step(step: XmlStep) -> Option<RawStep> {
    match step.step_type.as_str() {
        "message" => Some(RawStep::Message { text: step.text.unwrap_or_default() }),
        "collect" => Some(RawStep::Collect {
            slot: step.slot?,
            entity: step.entity.unwrap_or_default(),
            prompt: step.text.unwrap_or_default(),
            retries: step.retries,
        }),
        "condition" => Some(RawStep::Condition {
            expression: step.expression.unwrap_or_default(),
            target: step.target?,
        }),
        "navigate" => Some(RawStep::Navigate { target: step.target? }),
        "subdialog" => Some(RawStep::SubDialogInvoke { target: step.target? }),
        _ => None,
    }
}

// ---- Dialogflow-CX-style JSON bundle ----

#[derive(Debug, Deserialize)]
struct JsonBundle {
    #[serde(default)]
    pages: Vec<JsonPage>,
    #[serde(default)]
    intents: Vec<JsonIntent>,
    #[serde(default)]
    entities: Vec<JsonEntity>,
}

#[derive(Debug, Deserialize)]
struct JsonPage {
    name: String,
    #[serde(default)]
    fulfillment_messages: Vec<String>,
    #[serde(default)]
    form_parameters: Vec<JsonFormParameter>,
    #[serde(default)]
    transitions: Vec<JsonTransition>,
}

#[derive(Debug, Deserialize)]
struct JsonFormParameter {
    slot: String,
    entity: String,
    prompt: String,
    #[serde(default)]
    reprompts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JsonTransition {
    #[serde(default)]
    condition: Option<String>,
    target_page: String,
}

#[derive(Debug, Deserialize)]
struct JsonIntent {
    display_name: String,
    #[serde(default)]
    training_phrases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JsonEntity {
    display_name: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    regex: Option<String>,
}

/// Parses a Dialogflow-CX-style JSON page-graph export into a [`RawBundle`] (spec §4.C
/// step 1).
pub fn parse_dialogflow_cx_bundle(json: &str) -> Result<RawBundle, ConfigError> {
    let parsed: JsonBundle =
        serde_json::from_str(json).map_err(|source| ConfigError::Json { path: "<in-memory>".into(), source })?;

    let dialogs = parsed
        .pages
        .into_iter()
        .map(|page| {
            let mut steps = Vec::new();
            for param in page.form_parameters {
                steps.push(RawStep::Collect {
                    slot: param.slot,
                    entity: param.entity,
                    prompt: param.prompt,
                    retries: param.reprompts,
                });
            }
            for message in page.fulfillment_messages {
                steps.push(RawStep::Message { text: message });
            }
            for transition in page.transitions {
                steps.push(match transition.condition {
                    Some(expression) => RawStep::Condition { expression, target: transition.target_page },
                    None => RawStep::Navigate { target: transition.target_page },
                });
            }
            RawDialog { name: page.name, steps }
        })
        .collect();

    let intents = parsed
        .intents
        .into_iter()
        .map(|i| RawIntent {
            name: i.display_name,
            training_utterances: i.training_phrases,
        })
        .collect();

    let entities = parsed
        .entities
        .into_iter()
        .map(|e| match e.regex {
            Some(pattern) => RawEntityDef::Regex { name: e.display_name, pattern },
            None => RawEntityDef::ValueList {
                name: e.display_name,
                values: e.synonyms,
            },
        })
        .collect();

    Ok(RawBundle { dialogs, intents, entities })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_botbuilder_xml() {
        let xml = r#"
            <bundle>
                <dialog name="book_flight">
                    <step type="message"><text>Sure, let's book a flight.</text></step>
                    <step type="collect" slot="destination" entity="city">
                        <text>Where to?</text>
                        <retry>Sorry, which city?</retry>
                    </step>
                    <step type="navigate" target="confirm" />
                </dialog>
                <intent name="book_flight">
                    <utterance>I want to fly somewhere</utterance>
                </intent>
                <entity name="city" kind="value_list">
                    <value>Paris</value>
                    <value>Rome</value>
                </entity>
            </bundle>
        "#;
        let bundle = parse_botbuilder_bundle(xml).unwrap();
        assert_eq!(bundle.dialogs.len(), 1);
        assert_eq!(bundle.dialogs[0].steps.len(), 3);
        assert_eq!(bundle.intents[0].name, "book_flight");
        assert_eq!(bundle.entities.len(), 1);
    }

    #[test]
    fn parses_minimal_dialogflow_cx_json() {
        let json = r#"
        {
            "pages": [
                {
                    "name": "collect_destination",
                    "fulfillment_messages": ["All set!"],
                    "form_parameters": [
                        {"slot": "destination", "entity": "city", "prompt": "Where to?", "reprompts": []}
                    ],
                    "transitions": [
                        {"target_page": "confirm"}
                    ]
                }
            ],
            "intents": [
                {"display_name": "book_flight", "training_phrases": ["I want to fly somewhere"]}
            ],
            "entities": [
                {"display_name": "city", "synonyms": ["Paris", "Rome"]}
            ]
        }
        "#;
        let bundle = parse_dialogflow_cx_bundle(json).unwrap();
        assert_eq!(bundle.dialogs.len(), 1);
        assert_eq!(bundle.dialogs[0].steps.len(), 3);
        assert_eq!(bundle.intents[0].training_utterances[0], "I want to fly somewhere");
    }

    #[test]
    fn malformed_xml_is_a_config_error() {
        let result = parse_botbuilder_bundle("<not-xml");
        assert!(result.is_err());
    }
}
