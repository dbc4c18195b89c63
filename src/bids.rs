//! BIDS dataset traversal and NORDIC derivative layout
//!
//! Magnitude series are found at `sub-*/ses-*/func/*_bold.nii.gz`, with the
//! phase series alongside as `*_part-phase_bold.nii.gz`. Derivatives go to
//! `derivatives/nordic/` mirroring the source directory structure.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{NordicError, Result};
use crate::nifti_io::{save_nifti_to_file, NiftiSeries};

const BOLD_SUFFIX: &str = "_bold.nii.gz";
const PHASE_BOLD_SUFFIX: &str = "_part-phase_bold.nii.gz";

/// Derivatives directory relative to the dataset root
pub fn derivatives_root(bids_root: &Path) -> PathBuf {
    bids_root.join("derivatives").join("nordic")
}

/// Output locations for one magnitude series
#[derive(Clone, Debug, PartialEq)]
pub struct DerivativePaths {
    pub out_dir: PathBuf,
    pub base: String,
}

impl DerivativePaths {
    pub fn new(out_dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            base: base.into(),
        }
    }

    /// Derivative paths for a magnitude file found under `bids_root`
    pub fn for_magnitude(bids_root: &Path, magnitude: &Path) -> Result<Self> {
        let rel = magnitude.strip_prefix(bids_root).map_err(|_| {
            NordicError::InvalidInput(format!(
                "{} is not inside {}", magnitude.display(), bids_root.display()
            ))
        })?;
        let out_dir = match rel.parent() {
            Some(parent) => derivatives_root(bids_root).join(parent),
            None => derivatives_root(bids_root),
        };
        Ok(Self::new(out_dir, bold_base(magnitude)))
    }

    fn desc(&self, desc: &str) -> PathBuf {
        self.out_dir.join(format!("{}_desc-{}_bold.nii.gz", self.base, desc))
    }

    pub fn functional_raw(&self) -> PathBuf {
        self.desc("functional")
    }

    pub fn functional_nordic(&self) -> PathBuf {
        self.desc("functional-nordic")
    }

    pub fn noise_raw(&self) -> PathBuf {
        self.desc("noise")
    }

    pub fn noise_nordic(&self) -> PathBuf {
        self.desc("noise-nordic")
    }

    /// Files a completed run leaves behind
    pub fn expected_outputs(&self, noise_present: bool) -> Vec<PathBuf> {
        if noise_present {
            vec![
                self.functional_raw(),
                self.functional_nordic(),
                self.noise_raw(),
                self.noise_nordic(),
            ]
        } else {
            vec![self.functional_nordic()]
        }
    }

    pub fn outputs_exist(&self, noise_present: bool) -> bool {
        self.expected_outputs(noise_present).iter().all(|p| p.exists())
    }
}

/// File name with the `_bold.nii.gz` suffix removed
pub fn bold_base(magnitude: &Path) -> String {
    let name = magnitude
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(BOLD_SUFFIX) {
        Some(base) => base.to_string(),
        None => name,
    }
}

/// Expected phase series for a magnitude series
pub fn phase_counterpart(magnitude: &Path) -> PathBuf {
    let name = magnitude
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let phase_name = match name.strip_suffix(BOLD_SUFFIX) {
        Some(stem) => format!("{}{}", stem, PHASE_BOLD_SUFFIX),
        None => name,
    };
    magnitude.with_file_name(phase_name)
}

/// Phase series for `magnitude`, or `MissingCounterpart` if absent
pub fn find_phase_counterpart(magnitude: &Path) -> Result<PathBuf> {
    let phase = phase_counterpart(magnitude);
    if phase.is_file() && phase != magnitude {
        Ok(phase)
    } else {
        Err(NordicError::MissingCounterpart(magnitude.to_path_buf()))
    }
}

/// Participant/session selection; `None` selects everything
#[derive(Clone, Debug, Default)]
pub struct BidsFilter {
    participants: Option<BTreeSet<String>>,
    sessions: Option<BTreeSet<String>>,
}

impl BidsFilter {
    /// Labels may be given with or without their `sub-` / `ses-` prefix.
    pub fn new(participants: Option<Vec<String>>, sessions: Option<Vec<String>>) -> Self {
        let normalize = |labels: Vec<String>, prefix: &str| -> BTreeSet<String> {
            labels
                .iter()
                .map(|l| l.strip_prefix(prefix).unwrap_or(l).to_string())
                .collect()
        };
        Self {
            participants: participants.map(|l| normalize(l, "sub-")),
            sessions: sessions.map(|l| normalize(l, "ses-")),
        }
    }

    fn accepts(selection: &Option<BTreeSet<String>>, label: &str) -> bool {
        selection.as_ref().map_or(true, |set| set.contains(label))
    }

    pub fn accepts_participant(&self, label: &str) -> bool {
        Self::accepts(&self.participants, label)
    }

    pub fn accepts_session(&self, label: &str) -> bool {
        Self::accepts(&self.sessions, label)
    }
}

/// Sorted subdirectories of `dir` named `<prefix><label>`, with their labels
fn labelled_dirs(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| NordicError::io(dir, e))? {
        let entry = entry.map_err(|e| NordicError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(label) = name.strip_prefix(prefix) {
            found.push((label.to_string(), path));
        }
    }
    found.sort();
    Ok(found)
}

/// Magnitude BOLD series under `sub-*/ses-*/func/`, sorted by path
///
/// Phase series (`part-phase` in the name) are excluded.
pub fn find_func_files(bids_root: &Path, filter: &BidsFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for (sub_label, sub_dir) in labelled_dirs(bids_root, "sub-")? {
        if !filter.accepts_participant(&sub_label) {
            continue;
        }
        for (ses_label, ses_dir) in labelled_dirs(&sub_dir, "ses-")? {
            if !filter.accepts_session(&ses_label) {
                continue;
            }
            let func_dir = ses_dir.join("func");
            if !func_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&func_dir).map_err(|e| NordicError::io(&func_dir, e))? {
                let entry = entry.map_err(|e| NordicError::io(&func_dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(BOLD_SUFFIX) && !name.contains("part-phase") && entry.path().is_file() {
                    files.push(entry.path());
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DatasetDescription {
    name: &'static str,
    #[serde(rename = "BIDSVersion")]
    bids_version: &'static str,
    pipeline_description: PipelineDescription,
    generated_by: Vec<GeneratedBy>,
    source_datasets: Vec<SourceDataset>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PipelineDescription {
    name: &'static str,
    version: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GeneratedBy {
    name: &'static str,
    version: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
struct SourceDataset {
    #[serde(rename = "URL")]
    url: &'static str,
    #[serde(rename = "Description")]
    description: &'static str,
}

/// Write `dataset_description.json` into the derivatives root.
///
/// An existing description is left untouched. Returns whether a file was written.
pub fn write_dataset_description(deriv_root: &Path) -> Result<bool> {
    let desc_file = deriv_root.join("dataset_description.json");
    if desc_file.exists() {
        return Ok(false);
    }

    let desc = DatasetDescription {
        name: "NORDIC Denoising",
        bids_version: "1.9.0",
        pipeline_description: PipelineDescription {
            name: "NORDIC",
            version: "1.0",
            description: "NORDIC denoising applied to fMRI magnitude/phase images",
        },
        generated_by: vec![GeneratedBy {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: "Rust wrapper for the MATLAB NIFTI_NORDIC pipeline",
        }],
        source_datasets: vec![SourceDataset {
            url: "file://../..",
            description: "Raw BIDS dataset",
        }],
    };

    fs::create_dir_all(deriv_root).map_err(|e| NordicError::io(deriv_root, e))?;
    write_json(&desc_file, &desc)?;
    Ok(true)
}

/// `x.nii.gz` / `x.nii` -> `x.json`
pub fn sidecar_path(nifti_path: &Path) -> PathBuf {
    let name = nifti_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = crate::nifti_io::strip_nifti_extension(&name);
    nifti_path.with_file_name(format!("{}.json", stem))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    fs::write(path, buf).map_err(|e| NordicError::io(path, e))
}

/// Write the JSON sidecar for `out_path`: a copy of the source metadata (if
/// any) with `Description` set.
pub fn write_sidecar(out_path: &Path, source_json: &Path, description: &str) -> Result<PathBuf> {
    let mut meta = if source_json.is_file() {
        let text = fs::read_to_string(source_json).map_err(|e| NordicError::io(source_json, e))?;
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => map,
            _ => {
                return Err(NordicError::InvalidInput(format!(
                    "sidecar {} is not a JSON object", source_json.display()
                )))
            }
        }
    } else {
        Map::new()
    };
    meta.insert("Description".to_string(), Value::String(description.to_string()));

    let json_out = sidecar_path(out_path);
    write_json(&json_out, &Value::Object(meta))?;
    Ok(json_out)
}

/// Save a partition and its sidecar
pub fn save_with_sidecar(image: &NiftiSeries, out_path: &Path, source_json: &Path, description: &str) -> Result<()> {
    save_nifti_to_file(out_path, image)?;
    write_sidecar(out_path, source_json, description)?;
    Ok(())
}
