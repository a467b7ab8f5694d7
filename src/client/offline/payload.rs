//! Payload builder
//!
//! Turns a [`Record`] into the flat parameter map and staged file list the
//! dispatcher sends. Field mapping is declared per record type through
//! [`FormSchema`]; this module adds the envelope keys (`id`, `coverId`) and
//! leaves out local bookkeeping (`tempId`, sync state).

use crate::shared::form::{FormSchema, FormWriter, Payload};
use crate::shared::record::{Record, RecordBody};

pub struct PayloadBuilder;

impl PayloadBuilder {
    pub fn build(record: &Record) -> Payload {
        let mut payload = Payload::default();
        {
            let mut writer = FormWriter::new(&mut payload);
            writer.field("id", &record.id);
            writer.field("coverId", &record.cover_id);
            match &record.body {
                RecordBody::Survey(survey) => survey.write_form(&mut writer),
                RecordBody::Germplasm(germplasm) => germplasm.write_form(&mut writer),
            }
        }

        tracing::debug!(
            "[SYNC] built {} payload: {} field(s), {} file(s)",
            record.kind(),
            payload.params.len(),
            payload.files.len()
        );
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::form::FormValue;
    use crate::shared::media::{Media, RemoteMedia};
    use crate::shared::record::{Coordinate, Germplasm, GermplasmDetail, Survey};
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn wire(payload: &Payload, key: &str) -> String {
        payload
            .params
            .get(key)
            .map(FormValue::to_wire)
            .unwrap_or_else(|| panic!("missing key {}", key))
    }

    #[test]
    fn test_survey_flattening() {
        let record = Record::survey(Survey {
            tree_species: Some("Quercus".to_string()),
            common_name: Some(String::new()),
            estimated_age: Some(0),
            is_rare_species: Some(false),
            location: Some(Coordinate { x: 93.5, y: 29.25 }),
            investigator_id: Some(12),
            discovery_date: NaiveDate::from_ymd_opt(2024, 4, 30),
            multimedia: vec![
                Media::local("/data/photo-0.jpg"),
                Media::Remote(RemoteMedia {
                    id: "31".to_string(),
                    name: Some("old.jpg".to_string()),
                    path: Some("/upload/old.jpg".to_string()),
                    url: Some("https://cdn.example.org/old.jpg".to_string()),
                    screenshot_path: None,
                    media_type: Some("image".to_string()),
                }),
                Media::local("file:///data/photo-1.jpg"),
            ],
            ..Default::default()
        })
        .with_temp_id("t1");

        let payload = PayloadBuilder::build(&record);

        assert_eq!(wire(&payload, "treeSpecies"), "Quercus");
        assert_eq!(wire(&payload, "estimatedAge"), "0");
        assert_eq!(wire(&payload, "isRareSpecies"), "false");
        assert_eq!(wire(&payload, "location.x"), "93.5");
        assert_eq!(wire(&payload, "location.y"), "29.25");
        assert_eq!(wire(&payload, "discoveryDate"), "2024-04-30");
        assert_eq!(wire(&payload, "multimedia_[0].id"), "31");
        assert_eq!(wire(&payload, "multimedia_[0].type"), "image");
        assert!(!payload.params.contains_key("commonName"));
        assert!(!payload.params.contains_key("investigatorId"));
        assert!(!payload.params.contains_key("tempId"));
        assert!(!payload.params.contains_key("id"));

        let files: Vec<_> = payload
            .files
            .iter()
            .map(|f| (f.name.as_str(), f.path.clone()))
            .collect();
        assert_eq!(
            files,
            vec![
                ("multimedia[0]", PathBuf::from("/data/photo-0.jpg")),
                ("multimedia[1]", PathBuf::from("/data/photo-1.jpg")),
            ]
        );
    }

    #[test]
    fn test_envelope_keys() {
        let mut record = Record::survey(Survey::default()).with_id(88);
        record.cover_id = Some("501".to_string());

        let payload = PayloadBuilder::build(&record);
        assert_eq!(wire(&payload, "id"), "88");
        assert_eq!(wire(&payload, "coverId"), "501");
        assert!(!payload.has_files());
    }

    #[test]
    fn test_germplasm_details_and_dates() {
        let record = Record::germplasm(Germplasm {
            code_number: Some("GP-7".to_string()),
            collect_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
            signature_date: NaiveDate::from_ymd_opt(2024, 5, 2),
            collector_signature: vec![Media::local("file:///sign/collector.png")],
            details: vec![
                GermplasmDetail {
                    temp_id: Some("d0".to_string()),
                    collect_part: Some("seed".to_string()),
                    ..Default::default()
                },
                GermplasmDetail {
                    temp_id: Some("d1".to_string()),
                    collect_part: Some("scion".to_string()),
                    germplasm_sample_closeup: vec![
                        Media::remote(4, "https://cdn.example.org/4.jpg"),
                        Media::local("/data/closeup.jpg"),
                    ],
                    ..Default::default()
                },
            ],
            ..Default::default()
        })
        .with_temp_id("g1");

        let payload = PayloadBuilder::build(&record);

        assert_eq!(wire(&payload, "collectTime"), "2024-05-01T08:30:00.000Z");
        assert_eq!(wire(&payload, "signatureDate"), "2024-05-02");
        assert_eq!(wire(&payload, "details[0].collectPart"), "seed");
        assert_eq!(wire(&payload, "details[1].collectPart"), "scion");
        assert_eq!(wire(&payload, "details[1].germplasmSampleCloseup[0].id"), "4");
        assert!(!payload.params.keys().any(|k| k.ends_with("tempId")));

        let names: Vec<_> = payload.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["collectorSignature[0]", "details[1].germplasmSampleCloseup[0]"]
        );
    }
}
