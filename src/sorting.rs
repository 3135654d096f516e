use serde::Serialize;

use crate::error::ProcessorError;

/// The NWB units table does not record an acquisition rate.
pub const DEFAULT_SAMPLING_FREQUENCY: f64 = 30_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortingUnit {
    pub unit_id: i64,
    pub spike_frames: Vec<i32>,
}

/// Spike trains per unit, in sample frames, in units-table order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NwbSorting {
    pub sampling_frequency: f64,
    pub start_time_sec: Option<f64>,
    pub end_time_sec: Option<f64>,
    pub units: Vec<SortingUnit>,
}

impl NwbSorting {
    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.units.iter().map(|unit| unit.unit_id)
    }

    pub fn spike_train(&self, unit_id: i64) -> Option<&[i32]> {
        self.units
            .iter()
            .find(|unit| unit.unit_id == unit_id)
            .map(|unit| unit.spike_frames.as_slice())
    }

    pub fn total_spikes(&self) -> usize {
        self.units.iter().map(|unit| unit.spike_frames.len()).sum()
    }
}

/// Splits the ragged `spike_times` column using its cumulative end-offset
/// index. Unit `i` owns `spike_times[index[i - 1]..index[i]]`.
pub fn sorting_from_units(
    ids: &[i64],
    spike_times_index: &[u64],
    spike_times: &[f64],
    sampling_frequency: f64,
) -> Result<NwbSorting, ProcessorError> {
    if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
        return Err(ProcessorError::Configuration(format!(
            "sampling frequency must be positive, got {sampling_frequency}"
        )));
    }
    if ids.len() != spike_times_index.len() {
        return Err(ProcessorError::NwbLayout(format!(
            "{} unit ids but {} spike_times_index entries",
            ids.len(),
            spike_times_index.len()
        )));
    }

    let mut units = Vec::with_capacity(ids.len());
    let mut start = 0usize;
    for (&unit_id, &end) in ids.iter().zip(spike_times_index) {
        let end = usize::try_from(end)
            .map_err(|_| ProcessorError::NwbLayout(format!("index {end} overflows")))?;
        if end < start {
            return Err(ProcessorError::NwbLayout(format!(
                "spike_times_index decreases at unit {unit_id} ({end} < {start})"
            )));
        }
        if end > spike_times.len() {
            return Err(ProcessorError::NwbLayout(format!(
                "spike_times_index {end} exceeds {} spike times",
                spike_times.len()
            )));
        }
        let spike_frames = spike_times[start..end]
            .iter()
            .map(|&t| (t * sampling_frequency) as i32)
            .collect();
        units.push(SortingUnit {
            unit_id,
            spike_frames,
        });
        start = end;
    }

    let start_time_sec = spike_times.iter().copied().reduce(f64::min);
    let end_time_sec = spike_times.iter().copied().reduce(f64::max);
    tracing::debug!(?start_time_sec, ?end_time_sec, units = units.len(), "built sorting");

    Ok(NwbSorting {
        sampling_frequency,
        start_time_sec,
        end_time_sec,
        units,
    })
}

#[cfg(feature = "nwb")]
pub use nwb_file::read_nwb_sorting;

#[cfg(feature = "nwb")]
mod nwb_file {
    use std::path::Path;

    use hdf5::File;

    use super::{NwbSorting, sorting_from_units};
    use crate::error::ProcessorError;

    /// Reads `units/id`, `units/spike_times_index` and `units/spike_times`.
    pub fn read_nwb_sorting(
        path: &Path,
        sampling_frequency: f64,
    ) -> Result<NwbSorting, ProcessorError> {
        let file = File::open(path).map_err(|err| ProcessorError::Nwb(err.to_string()))?;
        let units = file
            .group("units")
            .map_err(|err| ProcessorError::Nwb(format!("units table: {err}")))?;

        let read = |name: &str| {
            units
                .dataset(name)
                .map_err(|err| ProcessorError::Nwb(format!("units/{name}: {err}")))
        };
        let ids: Vec<i64> = read("id")?
            .read_raw()
            .map_err(|err| ProcessorError::Nwb(format!("units/id: {err}")))?;
        let index: Vec<u64> = read("spike_times_index")?
            .read_raw()
            .map_err(|err| ProcessorError::Nwb(format!("units/spike_times_index: {err}")))?;
        let spike_times: Vec<f64> = read("spike_times")?
            .read_raw()
            .map_err(|err| ProcessorError::Nwb(format!("units/spike_times: {err}")))?;

        sorting_from_units(&ids, &index, &spike_times, sampling_frequency)
    }
}
