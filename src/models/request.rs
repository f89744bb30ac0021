use serde::Deserialize;

use super::Action;
use crate::error::{AppError, Result};

/// Parametri grezzi di una richiesta di trasformazione
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionParams {
    /// Estensione di destinazione (solo transcode)
    #[serde(default)]
    pub extension: Option<String>,
    /// Larghezza e altezza separate da virgola, es: "50,50"
    #[serde(default)]
    pub size: Option<String>,
    /// Box separato da virgola, es: "0,50,900,200"
    #[serde(default, rename = "box")]
    pub bbox: Option<String>,
}

impl ActionParams {
    pub fn extension(ext: &str) -> Self {
        Self {
            extension: Some(ext.to_string()),
            ..Default::default()
        }
    }

    pub fn size(size: &str) -> Self {
        Self {
            size: Some(size.to_string()),
            ..Default::default()
        }
    }

    pub fn bbox(bbox: &str) -> Self {
        Self {
            bbox: Some(bbox.to_string()),
            ..Default::default()
        }
    }
}

impl Action {
    /// Valida nome azione e parametri prima che il job venga creato
    pub fn from_request(action: &str, params: &ActionParams) -> Result<Self> {
        match action.trim().to_lowercase().as_str() {
            "transcode" => {
                let ext = params.extension.as_deref().ok_or_else(|| {
                    AppError::InvalidParameters("Il transcode richiede un'estensione".to_string())
                })?;
                Action::transcode(ext)
            }
            "resize" => {
                let values = parse_integers(params.size.as_deref(), 2).ok_or_else(|| {
                    AppError::InvalidParameters(
                        "Dimensioni non valide. Specifica larghezza e altezza separate da virgola: \"50,50\""
                            .to_string(),
                    )
                })?;
                Action::resize(values[0], values[1])
            }
            "crop" => {
                let values = parse_integers(params.bbox.as_deref(), 4).ok_or_else(|| {
                    AppError::InvalidParameters(
                        "Box non valido. Specifica il box separato da virgola: \"50,150,90,80\""
                            .to_string(),
                    )
                })?;
                Action::crop(values[0], values[1], values[2], values[3])
            }
            "" => Err(AppError::InvalidAction("Specifica un'azione".to_string())),
            other => Err(AppError::InvalidAction(format!(
                "Azione sconosciuta: {}",
                other
            ))),
        }
    }
}

/// Esattamente `count` interi separati da virgola
fn parse_integers(raw: Option<&str>, count: usize) -> Option<Vec<i64>> {
    let values = raw?
        .split(',')
        .map(|part| part.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;

    (values.len() == count).then_some(values)
}
