use chrono::NaiveDate;
use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ Map, Value };
use std::collections::BTreeMap;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Lab values recorded for one date. A lab value the user left blank is
/// stored as `null`; keys this service does not model are carried in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "hsCRP", default)]
    pub hs_crp: Option<f64>,
    #[serde(default)]
    pub hba1c: Option<f64>,
    #[serde(default)]
    pub fasting_glucose: Option<f64>,
    #[serde(default)]
    pub ldl_cholesterol: Option<f64>,
    #[serde(default)]
    pub triglycerides: Option<f64>,
    #[serde(default)]
    pub hdl_cholesterol: Option<f64>,
    #[serde(rename = "ALT_liver_enzymes", default)]
    pub alt_liver_enzymes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triglyceride_hdl_ratio: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reading {
    /// Applies a later submission for the same date. Lab values are written as
    /// sent, so a `null` clears the stored value; the ratio only when it was sent.
    /// Unmodelled keys already on the record are kept.
    pub fn apply(&mut self, update: Reading) {
        self.hs_crp = update.hs_crp;
        self.hba1c = update.hba1c;
        self.fasting_glucose = update.fasting_glucose;
        self.ldl_cholesterol = update.ldl_cholesterol;
        self.triglycerides = update.triglycerides;
        self.hdl_cholesterol = update.hdl_cholesterol;
        self.alt_liver_enzymes = update.alt_liver_enzymes;
        if update.triglyceride_hdl_ratio.is_some() {
            self.triglyceride_hdl_ratio = update.triglyceride_hdl_ratio;
        }
        self.extra.extend(update.extra);
    }
}

/// Readings keyed by ISO date; ordered so the stored document is chronological.
pub type ReadingSet = BTreeMap<String, Reading>;

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("Malformed reading: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid reading date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Key must be present; `null` is accepted and means "left blank".
fn nullable<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where D: Deserializer<'de>
{
    Option::<f64>::deserialize(deserializer)
}

/// Body of an add-reading request. Every lab value key is required but may be
/// `null`; the ratio may be omitted.
#[derive(Clone, Debug, Deserialize)]
pub struct ReadingSubmission {
    pub date: String,
    #[serde(rename = "hsCRP", deserialize_with = "nullable")]
    pub hs_crp: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub hba1c: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub fasting_glucose: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub ldl_cholesterol: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub triglycerides: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub hdl_cholesterol: Option<f64>,
    #[serde(rename = "ALT_liver_enzymes", deserialize_with = "nullable")]
    pub alt_liver_enzymes: Option<f64>,
    #[serde(default)]
    pub triglyceride_hdl_ratio: Option<f64>,
}

impl ReadingSubmission {
    pub fn from_slice(body: &[u8]) -> Result<Self, ReadingError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Splits the submission into its validated date key and the reading to apply.
    pub fn into_parts(self) -> Result<(String, Reading), ReadingError> {
        let date = self.date.trim();
        if NaiveDate::parse_from_str(date, DATE_FORMAT).is_err() {
            return Err(ReadingError::InvalidDate(self.date));
        }
        let reading = Reading {
            hs_crp: self.hs_crp,
            hba1c: self.hba1c,
            fasting_glucose: self.fasting_glucose,
            ldl_cholesterol: self.ldl_cholesterol,
            triglycerides: self.triglycerides,
            hdl_cholesterol: self.hdl_cholesterol,
            alt_liver_enzymes: self.alt_liver_enzymes,
            triglyceride_hdl_ratio: self.triglyceride_hdl_ratio,
            extra: Map::new(),
        };
        Ok((date.to_string(), reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission_json() -> serde_json::Value {
        json!({
            "date": "2024-01-01",
            "hsCRP": 1.2,
            "hba1c": 5.4,
            "fasting_glucose": 90,
            "ldl_cholesterol": 100,
            "triglycerides": 80,
            "hdl_cholesterol": 50,
            "ALT_liver_enzymes": 20
        })
    }

    #[test]
    fn submission_keeps_wire_field_names() {
        let body = serde_json::to_vec(&submission_json()).unwrap();
        let (date, reading) = ReadingSubmission::from_slice(&body).unwrap().into_parts().unwrap();
        assert_eq!(date, "2024-01-01");
        assert_eq!(reading.hs_crp, Some(1.2));
        assert_eq!(reading.alt_liver_enzymes, Some(20.0));
        assert_eq!(reading.triglyceride_hdl_ratio, None);

        let stored = serde_json::to_value(&reading).unwrap();
        assert!(stored.get("hsCRP").is_some());
        assert!(stored.get("ALT_liver_enzymes").is_some());
        assert!(stored.get("triglyceride_hdl_ratio").is_none());
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut value = submission_json();
        value.as_object_mut().unwrap().remove("hba1c");
        let body = serde_json::to_vec(&value).unwrap();
        assert!(matches!(ReadingSubmission::from_slice(&body), Err(ReadingError::Malformed(_))));
    }

    #[test]
    fn non_iso_date_is_rejected() {
        let mut value = submission_json();
        value["date"] = json!("01/02/2024");
        let body = serde_json::to_vec(&value).unwrap();
        let err = ReadingSubmission::from_slice(&body).unwrap().into_parts().unwrap_err();
        assert!(matches!(err, ReadingError::InvalidDate(_)));
    }

    #[test]
    fn null_lab_value_is_accepted_as_blank() {
        let mut value = submission_json();
        value["hsCRP"] = json!(null);
        let body = serde_json::to_vec(&value).unwrap();
        let (_, reading) = ReadingSubmission::from_slice(&body).unwrap().into_parts().unwrap();
        assert_eq!(reading.hs_crp, None);
        assert_eq!(reading.hba1c, Some(5.4));

        let stored = serde_json::to_value(&reading).unwrap();
        assert_eq!(stored.get("hsCRP"), Some(&json!(null)));
    }

    #[test]
    fn apply_writes_lab_values_as_sent() {
        let mut existing = Reading {
            hs_crp: Some(1.2),
            hba1c: Some(5.4),
            triglyceride_hdl_ratio: Some(1.6),
            ..Default::default()
        };
        existing.apply(Reading { hba1c: Some(5.9), ..Default::default() });

        assert_eq!(existing.hba1c, Some(5.9));
        assert_eq!(existing.hs_crp, None);
        assert_eq!(existing.triglyceride_hdl_ratio, Some(1.6));
    }

    #[test]
    fn unknown_stored_keys_survive_an_update() {
        let mut existing: Reading = serde_json::from_value(
            json!({"hba1c": 5.4, "vitamin_d": 31, "notes": "fasting"})
        ).unwrap();
        assert_eq!(existing.extra.len(), 2);

        existing.apply(Reading { hba1c: Some(5.6), ..Default::default() });
        let stored = serde_json::to_value(&existing).unwrap();
        assert_eq!(stored["hba1c"], 5.6);
        assert_eq!(stored["vitamin_d"], 31);
        assert_eq!(stored["notes"], "fasting");
    }
}
