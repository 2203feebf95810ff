/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Experiment data: observed states, peptide-to-protein mapping and known
// concentrations, with validation and delimited-table loaders.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Experiment data
//!
//! Every observed state carries a log intensity and the index of the peptide
//! it belongs to; every peptide maps to one protein. Index spaces are dense
//! and zero-based, and fixed before any partitioning happens.

pub mod partition;

use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::config::DataConfig;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}, line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("intensities ({intensities}) and state mapping ({mapping}) lengths differ")]
    LengthMismatch { intensities: usize, mapping: usize },
    #[error("peptide mapping must contain at least one peptide")]
    EmptyPeptideMapping,
    #[error("state {state} maps to peptide {peptide}, but only {n_peptides} peptides exist")]
    StateMappingOutOfRange {
        state: usize,
        peptide: usize,
        n_peptides: usize,
    },
    #[error("state {state} has non-finite intensity {value}")]
    NonFiniteIntensity { state: usize, value: f64 },
    #[error("protein {protein} has no peptides")]
    ProteinWithoutPeptides { protein: usize },
    #[error("{kind} list has {found} names for {expected} entries")]
    NameCountMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("known concentration of protein {protein} is not finite")]
    NonFiniteConcentration { protein: usize },
    #[error("known concentration given for protein {protein}, but only {n_proteins} proteins exist")]
    UnknownStandard { protein: usize, n_proteins: usize },
    #[error("protein {protein} has more than one known concentration")]
    DuplicateStandard { protein: usize },
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Observed intensities with their state and peptide mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentData {
    intensities_obs: Vec<f64>,
    mapping_states_obs: Vec<usize>,
    mapping_peptides: Vec<usize>,
    n_proteins: usize,
    known_concentrations: KnownConcentrations,
}

impl ExperimentData {
    /// # Errors
    ///
    /// Returns `DataError` if the mappings are inconsistent, an intensity is
    /// not finite, or a protein index has no peptides.
    pub fn new(
        intensities_obs: Vec<f64>,
        mapping_states_obs: Vec<usize>,
        mapping_peptides: Vec<usize>,
    ) -> Result<Self, DataError> {
        if intensities_obs.len() != mapping_states_obs.len() {
            return Err(DataError::LengthMismatch {
                intensities: intensities_obs.len(),
                mapping: mapping_states_obs.len(),
            });
        }
        let n_peptides = mapping_peptides.len();
        let Some(&max_protein) = mapping_peptides.iter().max() else {
            return Err(DataError::EmptyPeptideMapping);
        };
        for (state, (&peptide, &value)) in mapping_states_obs
            .iter()
            .zip(intensities_obs.iter())
            .enumerate()
        {
            if peptide >= n_peptides {
                return Err(DataError::StateMappingOutOfRange {
                    state,
                    peptide,
                    n_peptides,
                });
            }
            if !value.is_finite() {
                return Err(DataError::NonFiniteIntensity { state, value });
            }
        }

        let n_proteins = max_protein + 1;
        let mut has_peptide = vec![false; n_proteins];
        for &protein in &mapping_peptides {
            has_peptide[protein] = true;
        }
        if let Some(protein) = has_peptide.iter().position(|&seen| !seen) {
            return Err(DataError::ProteinWithoutPeptides { protein });
        }

        Ok(Self {
            intensities_obs,
            mapping_states_obs,
            mapping_peptides,
            n_proteins,
            known_concentrations: KnownConcentrations::default(),
        })
    }

    /// Attach the standards of a supervised run. Partitions carry the
    /// standards of their own proteins.
    ///
    /// # Errors
    ///
    /// Returns `DataError` if a standard names a protein outside the data or
    /// a protein appears twice.
    pub fn with_known_concentrations(mut self, known: KnownConcentrations) -> Result<Self, DataError> {
        let mut seen = vec![false; self.n_proteins];
        for &protein in &known.proteins {
            let slot = seen.get_mut(protein).ok_or(DataError::UnknownStandard {
                protein,
                n_proteins: self.n_proteins,
            })?;
            if *slot {
                return Err(DataError::DuplicateStandard { protein });
            }
            *slot = true;
        }
        self.known_concentrations = known;
        Ok(self)
    }

    #[must_use]
    pub const fn known_concentrations(&self) -> &KnownConcentrations {
        &self.known_concentrations
    }

    /// Load the state file and peptide mapping named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DataError` if a file cannot be read or parsed, or the loaded
    /// data are inconsistent.
    pub fn load(config: &DataConfig) -> Result<Self, DataError> {
        let delimiter = config.delimiter()?;
        let mut intensities: Vec<f64> = Vec::new();
        let mut mapping_states: Vec<usize> = Vec::new();
        for_each_record(&config.path_data_state, delimiter, 2, |line, fields| {
            mapping_states.push(parse_field(&config.path_data_state, line, fields[0])?);
            intensities.push(parse_field(&config.path_data_state, line, fields[1])?);
            Ok(())
        })?;

        let mut mapping_peptides: Vec<usize> = Vec::new();
        for_each_record(&config.path_mapping_peptides, delimiter, 1, |line, fields| {
            mapping_peptides.push(parse_field(&config.path_mapping_peptides, line, fields[0])?);
            Ok(())
        })?;

        let data = Self::new(intensities, mapping_states, mapping_peptides)?;
        info!(
            "loaded {} observed states, {} peptides, {} proteins",
            data.n_states_obs(),
            data.n_peptides(),
            data.n_proteins()
        );
        Ok(data)
    }

    #[must_use]
    pub fn intensities_obs(&self) -> &[f64] {
        &self.intensities_obs
    }

    #[must_use]
    pub fn mapping_states_obs(&self) -> &[usize] {
        &self.mapping_states_obs
    }

    #[must_use]
    pub fn mapping_peptides(&self) -> &[usize] {
        &self.mapping_peptides
    }

    #[must_use]
    pub const fn n_proteins(&self) -> usize {
        self.n_proteins
    }

    #[must_use]
    pub fn n_peptides(&self) -> usize {
        self.mapping_peptides.len()
    }

    #[must_use]
    pub fn n_states_obs(&self) -> usize {
        self.intensities_obs.len()
    }

    /// Observed states per peptide.
    #[must_use]
    pub fn n_obs_states_per_peptide(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_peptides()];
        for &peptide in &self.mapping_states_obs {
            counts[peptide] += 1;
        }
        counts
    }
}

/// Known concentrations of the calibration standards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownConcentrations {
    pub proteins: Vec<usize>,
    pub concentrations: Vec<f64>,
}

impl KnownConcentrations {
    /// # Errors
    ///
    /// Returns `DataError` if the file cannot be read or parsed, or a
    /// concentration is not finite.
    pub fn load(path: &Path, delimiter: u8) -> Result<Self, DataError> {
        let mut known = Self::default();
        for_each_record(path, delimiter, 2, |line, fields| {
            let protein: usize = parse_field(path, line, fields[0])?;
            let concentration: f64 = parse_field(path, line, fields[1])?;
            if !concentration.is_finite() {
                return Err(DataError::NonFiniteConcentration { protein });
            }
            known.proteins.push(protein);
            known.concentrations.push(concentration);
            Ok(())
        })?;
        Ok(known)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }
}

/// Read a name list (one name per line) and check it covers `expected`
/// entries.
///
/// # Errors
///
/// Returns `DataError` if the file cannot be read, a line is blank or the
/// count is wrong. Line `i` names entry `i`, so blank lines are not skipped.
pub fn load_names(path: &Path, kind: &'static str, expected: usize) -> Result<Vec<String>, DataError> {
    let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let names = text
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let name = line.trim_end();
            if name.is_empty() {
                Err(DataError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: format!("blank {kind} name"),
                })
            } else {
                Ok(name.to_string())
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    if names.len() != expected {
        return Err(DataError::NameCountMismatch {
            kind,
            expected,
            found: names.len(),
        });
    }
    Ok(names)
}

fn for_each_record<F>(path: &Path, delimiter: u8, min_fields: usize, mut visit: F) -> Result<(), DataError>
where
    F: FnMut(usize, &[&str]) -> Result<(), DataError>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let line = index + 1;
        let fields: Vec<&str> = record.iter().collect();
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        if fields.len() < min_fields {
            return Err(DataError::Parse {
                path: path.to_path_buf(),
                line,
                message: format!("expected {min_fields} fields, found {}", fields.len()),
            });
        }
        visit(line, &fields)?;
    }
    Ok(())
}

fn parse_field<T>(path: &Path, line: usize, field: &str) -> Result<T, DataError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    field.parse().map_err(|err: T::Err| DataError::Parse {
        path: path.to_path_buf(),
        line,
        message: format!("cannot parse {field:?}: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
        path
    }

    #[test]
    fn rejects_state_mapped_past_last_peptide() {
        let err = ExperimentData::new(vec![1.0], vec![2], vec![0, 0]).expect_err("out of range");
        assert!(matches!(
            err,
            DataError::StateMappingOutOfRange {
                state: 0,
                peptide: 2,
                n_peptides: 2
            }
        ));
    }

    #[test]
    fn rejects_protein_gap() {
        let err = ExperimentData::new(vec![], vec![], vec![0, 2]).expect_err("gap");
        assert!(matches!(err, DataError::ProteinWithoutPeptides { protein: 1 }));
    }

    #[test]
    fn counts_observed_states() {
        let data = ExperimentData::new(vec![1.0, 2.0, 3.0], vec![1, 1, 0], vec![0, 0, 1])
            .expect("valid data");
        assert_eq!(data.n_proteins(), 2);
        assert_eq!(data.n_obs_states_per_peptide(), vec![1, 2, 0]);
    }

    #[test]
    fn loads_tab_separated_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let states = write_file(&dir, "states.tsv", "0\t10.5\n1\t11.25\n1\t9.0\n");
        let peptides = write_file(&dir, "peptides.tsv", "0\n1\n");
        let config = DataConfig {
            path_data_state: states,
            path_mapping_peptides: peptides,
            path_names_proteins: None,
            path_names_peptides: None,
            path_concentrations: None,
            sep_input: "\t".to_string(),
        };
        let data = ExperimentData::load(&config).expect("loads");
        assert_eq!(data.n_states_obs(), 3);
        assert_eq!(data.mapping_peptides(), &[0, 1]);
        assert!((data.intensities_obs()[1] - 11.25).abs() < 1.0e-12);
    }

    #[test]
    fn reports_unparseable_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "conc.tsv", "0\t1.5\n1\tabc\n");
        let err = KnownConcentrations::load(&path, b'\t').expect_err("bad number");
        assert!(matches!(err, DataError::Parse { line: 2, .. }));
    }

    #[test]
    fn name_list_must_match_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "names.txt", "ALBU_HUMAN\nTRFE_HUMAN\n");
        assert_eq!(
            load_names(&path, "protein", 2).expect("two names"),
            vec!["ALBU_HUMAN".to_string(), "TRFE_HUMAN".to_string()]
        );
        assert!(matches!(
            load_names(&path, "protein", 3),
            Err(DataError::NameCountMismatch { found: 2, .. })
        ));
    }

    #[test]
    fn blank_name_line_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(&dir, "names.txt", "ALBU_HUMAN\n\nTRFE_HUMAN\n");
        assert!(matches!(
            load_names(&path, "protein", 3),
            Err(DataError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn standards_must_name_distinct_existing_proteins() {
        let data = || ExperimentData::new(vec![1.0, 2.0], vec![0, 1], vec![0, 1]).expect("valid");
        let known = |proteins: Vec<usize>| KnownConcentrations {
            concentrations: vec![1.0; proteins.len()],
            proteins,
        };
        let attached = data().with_known_concentrations(known(vec![1])).expect("attaches");
        assert_eq!(attached.known_concentrations().proteins, vec![1]);
        assert!(matches!(
            data().with_known_concentrations(known(vec![2])),
            Err(DataError::UnknownStandard {
                protein: 2,
                n_proteins: 2
            })
        ));
        assert!(matches!(
            data().with_known_concentrations(known(vec![0, 0])),
            Err(DataError::DuplicateStandard { protein: 0 })
        ));
    }
}
