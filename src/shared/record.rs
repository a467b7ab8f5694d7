//! Field survey records
//!
//! Two record families are collected in the field: ancient-tree surveys and
//! germplasm (seed/sample) collections. Both share the same envelope: a
//! server id once the backend knows the record, a stable local `tempId`
//! until then, an optional cover reference for overwriting a conflicting
//! record, and the local sync state shown next to the record in lists.

use crate::shared::form::{FormSchema, FormWriter};
use crate::shared::media::Media;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longitude/latitude pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

/// Which record family a record or queue item belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Survey,
    Germplasm,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Survey => write!(f, "survey"),
            RecordKind::Germplasm => write!(f, "germplasm"),
        }
    }
}

/// Identity used to find a record across the store and the queue
///
/// The temporary id wins when both are present: it never changes for the
/// lifetime of the local copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Temp(String),
    Server(i64),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Temp(id) => write!(f, "tempId={}", id),
            RecordKey::Server(id) => write!(f, "id={}", id),
        }
    }
}

/// Sync state mirrored onto the local record copy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RecordSyncState {
    Pending,
    Synced,
    Error { message: String },
}

/// A survey or germplasm record plus its local bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Id of a conflicting remote record this submission may overwrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_state: Option<RecordSyncState>,
    pub body: RecordBody,
}

/// Record contents per family
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "fields", rename_all = "lowercase")]
pub enum RecordBody {
    Survey(Survey),
    Germplasm(Germplasm),
}

impl Record {
    pub fn survey(survey: Survey) -> Self {
        Self::new(RecordBody::Survey(survey))
    }

    pub fn germplasm(germplasm: Germplasm) -> Self {
        Self::new(RecordBody::Germplasm(germplasm))
    }

    fn new(body: RecordBody) -> Self {
        Self {
            id: None,
            temp_id: None,
            cover_id: None,
            sync_state: None,
            body,
        }
    }

    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Survey(_) => RecordKind::Survey,
            RecordBody::Germplasm(_) => RecordKind::Germplasm,
        }
    }

    /// Store/queue identity, `None` for a record with neither id
    pub fn key(&self) -> Option<RecordKey> {
        match (&self.temp_id, self.id) {
            (Some(temp_id), _) if !temp_id.is_empty() => Some(RecordKey::Temp(temp_id.clone())),
            (_, Some(id)) => Some(RecordKey::Server(id)),
            _ => None,
        }
    }

    /// Whether this record answers to `key`
    pub fn matches(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Temp(temp_id) => self.temp_id.as_deref() == Some(temp_id.as_str()),
            RecordKey::Server(id) => self.id == Some(*id),
        }
    }
}

/// Ancient tree survey
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Survey {
    #[serde(rename = "type")]
    pub tree_type: Option<String>,
    pub tree_species: Option<String>,
    pub tree_code: Option<String>,
    pub code_number: Option<String>,
    pub common_name: Option<String>,
    pub latin_name: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub species: Option<String>,
    pub estimated_age: Option<i64>,
    pub ownership_unit: Option<String>,
    pub batch: Option<String>,
    pub soil_layer_thickness: Option<f64>,
    pub land_parcels_name: Option<String>,
    pub location: Option<Coordinate>,
    pub area_code: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub small_place_name: Option<String>,
    pub altitude: Option<f64>,
    pub health_status: Option<String>,
    pub protection_level: Option<String>,
    pub protection_type: Option<String>,
    pub is_rare_species: Option<bool>,
    pub tree_height: Option<f64>,
    pub crown_width: Option<f64>,
    pub under_branch_height: Option<f64>,
    pub area: Option<f64>,
    pub quantity: Option<i64>,
    pub transplant_plan: Option<String>,
    pub measurement_dimension_type: Option<String>,
    pub measurement_info_estimate: Option<String>,
    pub specs: Option<String>,
    pub growth_environment: Option<String>,
    pub is_transplant: Option<String>,
    pub not_transplant: Option<String>,
    pub land_type: Option<String>,
    pub soil_texture: Option<String>,
    pub landform: Option<String>,
    pub slope: Option<String>,
    pub aspect: Option<String>,
    pub slope_position: Option<String>,
    pub site_condition_desc: Option<String>,
    pub protection_measure_type: Option<String>,
    pub team: Option<String>,
    pub relocation_protection: Option<String>,
    pub management_measures: Option<String>,
    pub relocation_place: Option<String>,
    pub project_schedule: Option<String>,
    pub labor_statistics: Option<String>,
    pub investment_estimate: Option<f64>,
    pub historical_anecdotes: Option<String>,
    pub discovery_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub investigate_status: Option<String>,
    pub task_manage_id: Option<i64>,
    pub finish_date: Option<NaiveDate>,
    /// Assigned server side; never sent back
    pub investigator_id: Option<i64>,
    pub multimedia: Vec<Media>,
}

impl FormSchema for Survey {
    fn write_form(&self, writer: &mut FormWriter<'_>) {
        crate::form_fields!(writer, self, {
            "type" => tree_type,
            "treeSpecies" => tree_species,
            "treeCode" => tree_code,
            "codeNumber" => code_number,
            "commonName" => common_name,
            "latinName" => latin_name,
            "family" => family,
            "genus" => genus,
            "species" => species,
            "estimatedAge" => estimated_age,
            "ownershipUnit" => ownership_unit,
            "batch" => batch,
            "soilLayerThickness" => soil_layer_thickness,
            "landParcelsName" => land_parcels_name,
            "areaCode" => area_code,
            "town" => town,
            "village" => village,
            "smallPlaceName" => small_place_name,
            "altitude" => altitude,
            "healthStatus" => health_status,
            "protectionLevel" => protection_level,
            "protectionType" => protection_type,
            "isRareSpecies" => is_rare_species,
            "treeHeight" => tree_height,
            "crownWidth" => crown_width,
            "underBranchHeight" => under_branch_height,
            "area" => area,
            "quantity" => quantity,
            "transplantPlan" => transplant_plan,
            "measurementDimensionType" => measurement_dimension_type,
            "measurementInfoEstimate" => measurement_info_estimate,
            "specs" => specs,
            "growthEnvironment" => growth_environment,
            "isTransplant" => is_transplant,
            "notTransplant" => not_transplant,
            "landType" => land_type,
            "soilTexture" => soil_texture,
            "landform" => landform,
            "slope" => slope,
            "aspect" => aspect,
            "slopePosition" => slope_position,
            "siteConditionDesc" => site_condition_desc,
            "protectionMeasureType" => protection_measure_type,
            "team" => team,
            "relocationProtection" => relocation_protection,
            "managementMeasures" => management_measures,
            "relocationPlace" => relocation_place,
            "projectSchedule" => project_schedule,
            "laborStatistics" => labor_statistics,
            "investmentEstimate" => investment_estimate,
            "historicalAnecdotes" => historical_anecdotes,
            "discoveryDate" => discovery_date,
            "remarks" => remarks,
            "investigateStatus" => investigate_status,
            "taskManageId" => task_manage_id,
            "finishDate" => finish_date,
        });
        writer.coordinate("location", self.location.as_ref());
        writer.media("multimedia", "multimedia_", &self.multimedia);
    }
}

/// Germplasm resource collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Germplasm {
    pub code_number: Option<String>,
    pub collect_time: Option<DateTime<Utc>>,
    pub weather: Option<String>,
    pub collect_team: Option<String>,
    pub collect_personnel: Option<String>,
    pub parent_health_status: Option<String>,
    pub has_pests_diseases: Option<String>,
    pub phenotype_description: Option<String>,
    pub community_environment: Option<String>,
    pub signature_date: Option<NaiveDate>,
    pub field_image_parent_tree: Vec<Media>,
    pub field_image_trunk_base: Vec<Media>,
    pub field_image_crown: Vec<Media>,
    pub field_image_habitat: Vec<Media>,
    pub collector_signature: Vec<Media>,
    pub recorder_signature: Vec<Media>,
    pub details: Vec<GermplasmDetail>,
}

impl FormSchema for Germplasm {
    fn write_form(&self, writer: &mut FormWriter<'_>) {
        crate::form_fields!(writer, self, {
            "codeNumber" => code_number,
            "collectTime" => collect_time,
            "weather" => weather,
            "collectTeam" => collect_team,
            "collectPersonnel" => collect_personnel,
            "parentHealthStatus" => parent_health_status,
            "hasPestsDiseases" => has_pests_diseases,
            "phenotypeDescription" => phenotype_description,
            "communityEnvironment" => community_environment,
            "signatureDate" => signature_date,
        });
        let media_fields = [
            ("fieldImageParentTree", &self.field_image_parent_tree),
            ("fieldImageTrunkBase", &self.field_image_trunk_base),
            ("fieldImageCrown", &self.field_image_crown),
            ("fieldImageHabitat", &self.field_image_habitat),
            ("collectorSignature", &self.collector_signature),
            ("recorderSignature", &self.recorder_signature),
        ];
        for (name, items) in media_fields {
            writer.media(name, name, items);
        }
        writer.nested("details", &self.details);
    }
}

/// One collected sample within a germplasm record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GermplasmDetail {
    /// Local-only identity for editing the detail in place
    pub temp_id: Option<String>,
    pub germplasm_resources_code: Option<String>,
    pub germplasm_type: Option<String>,
    pub collect_part: Option<String>,
    pub collect_method: Option<String>,
    pub collect_quantity: Option<String>,
    pub collect_unit: Option<String>,
    pub sample_quality_assessment: Option<String>,
    pub collect_maturity: Option<String>,
    pub appearance_description: Option<String>,
    pub pest_disease_situation: Option<String>,
    pub preliminary_treatment: Option<String>,
    pub container_packaging: Option<String>,
    pub packaging_spec_quantity: Option<String>,
    pub label_check_confirmation: Option<bool>,
    pub remarks: Option<String>,
    pub germplasm_sample_closeup: Vec<Media>,
}

impl FormSchema for GermplasmDetail {
    fn write_form(&self, writer: &mut FormWriter<'_>) {
        crate::form_fields!(writer, self, {
            "germplasmResourcesCode" => germplasm_resources_code,
            "germplasmType" => germplasm_type,
            "collectPart" => collect_part,
            "collectMethod" => collect_method,
            "collectQuantity" => collect_quantity,
            "collectUnit" => collect_unit,
            "sampleQualityAssessment" => sample_quality_assessment,
            "collectMaturity" => collect_maturity,
            "appearanceDescription" => appearance_description,
            "pestDiseaseSituation" => pest_disease_situation,
            "preliminaryTreatment" => preliminary_treatment,
            "containerPackaging" => container_packaging,
            "packagingSpecQuantity" => packaging_spec_quantity,
            "labelCheckConfirmation" => label_check_confirmation,
            "remarks" => remarks,
        });
        writer.media(
            "germplasmSampleCloseup",
            "germplasmSampleCloseup",
            &self.germplasm_sample_closeup,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefers_temp_id() {
        let record = Record::survey(Survey::default())
            .with_id(42)
            .with_temp_id("t1");
        assert_eq!(record.key(), Some(RecordKey::Temp("t1".to_string())));

        let record = Record::survey(Survey::default()).with_id(42);
        assert_eq!(record.key(), Some(RecordKey::Server(42)));

        assert_eq!(Record::survey(Survey::default()).key(), None);
    }

    #[test]
    fn test_matches_either_identity() {
        let record = Record::germplasm(Germplasm::default())
            .with_id(5)
            .with_temp_id("g1");
        assert!(record.matches(&RecordKey::Temp("g1".to_string())));
        assert!(record.matches(&RecordKey::Server(5)));
        assert!(!record.matches(&RecordKey::Server(6)));
    }

    #[test]
    fn test_record_json_round_trip_keeps_kind() {
        let record = Record::survey(Survey {
            tree_species: Some("Oak".to_string()),
            location: Some(Coordinate { x: 93.76, y: 29.23 }),
            multimedia: vec![Media::local("/tmp/oak.jpg")],
            ..Default::default()
        })
        .with_temp_id("t1");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tempId"], "t1");
        assert_eq!(json["body"]["kind"], "survey");
        assert_eq!(json["body"]["fields"]["treeSpecies"], "Oak");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.kind(), RecordKind::Survey);
    }

    #[test]
    fn test_survey_accepts_partial_json() {
        let survey: Survey = serde_json::from_str(r#"{"treeCode": "GS-001"}"#).unwrap();
        assert_eq!(survey.tree_code.as_deref(), Some("GS-001"));
        assert!(survey.multimedia.is_empty());
    }
}
