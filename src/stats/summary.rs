use std::path::Path;

use crate::data::filter::ChannelWhitelist;
use crate::data::loader::Decoder;
use crate::data::model::{ChannelSummaries, SampleMatrix};
use crate::error::{Error, Result};

/// Per-channel count, mean and sample variance of one matrix.
///
/// Two-pass per column: mean first, then squared deviations from it.
pub fn summarize(matrix: &SampleMatrix) -> Result<ChannelSummaries> {
    let count = matrix.n_rows() as u64;
    if count < 2 {
        return Err(Error::Domain { count });
    }
    let n = count as f64;

    let (means, variances): (Vec<f64>, Vec<f64>) = matrix
        .iter()
        .map(|(_, col)| {
            let mean = col.iter().sum::<f64>() / n;
            let m2: f64 = col.iter().map(|x| (x - mean) * (x - mean)).sum();
            (mean, m2 / (n - 1.0))
        })
        .unzip();

    ChannelSummaries::from_parts(matrix.columns().to_vec(), count, means, variances)
}

/// Decodes one recording, keeps the whitelisted channels and summarizes it.
///
/// The decoded matrix is dropped before returning; only the summary lives on.
pub struct FileSummarizer<'a> {
    decoder: &'a dyn Decoder,
    channels: &'a ChannelWhitelist,
}

impl<'a> FileSummarizer<'a> {
    pub fn new(decoder: &'a dyn Decoder, channels: &'a ChannelWhitelist) -> Self {
        Self { decoder, channels }
    }

    pub fn summarize(&self, path: &Path) -> Result<ChannelSummaries> {
        let matrix = self.decoder.decode(path)?;
        log::debug!(
            "decoded {}: {} samples x {} columns",
            path.display(),
            matrix.n_rows(),
            matrix.n_columns()
        );
        let matrix = self.channels.restrict(matrix)?;
        summarize(&matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(SampleMatrix);

    impl Decoder for Fixed {
        fn decode(&self, _path: &Path) -> Result<SampleMatrix> {
            Ok(self.0.clone())
        }
    }

    fn matrix(columns: &[&str], data: Vec<Vec<f64>>) -> SampleMatrix {
        SampleMatrix::new(columns.iter().map(|c| c.to_string()).collect(), data).unwrap()
    }

    #[test]
    fn mean_and_sample_variance() {
        let m = matrix(
            &["A", "B"],
            vec![
                vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0],
                vec![1.0; 8],
            ],
        );
        let s = summarize(&m).unwrap();
        assert_eq!(s.count(), 8);
        let a = s.get("A").unwrap();
        assert_eq!(a.mean, 5.0);
        assert!((a.variance - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(s.get("B").unwrap().variance, 0.0);
    }

    #[test]
    fn single_sample_is_a_domain_error() {
        let m = matrix(&["A"], vec![vec![1.0]]);
        assert!(matches!(summarize(&m), Err(Error::Domain { count: 1 })));
    }

    #[test]
    fn summarizer_keeps_only_whitelisted_channels_in_order() {
        let decoder = Fixed(matrix(
            &["time", "ECG", "P7-O1", "FP1-F7"],
            vec![
                vec![0.0, 1.0, 2.0],
                vec![9.0, 9.0, 8.0],
                vec![1.0, 2.0, 3.0],
                vec![3.0, 3.0, 6.0],
            ],
        ));
        let whitelist = ChannelWhitelist::new(["time", "FP1-F7", "P7-O1"]);
        let s = FileSummarizer::new(&decoder, &whitelist)
            .summarize(Path::new("unused.edf"))
            .unwrap();

        assert_eq!(s.channels(), ["FP1-F7", "P7-O1", "time"]);
        assert!(s.channels().iter().all(|c| whitelist.contains(c)));
        assert_eq!(s.get("P7-O1").unwrap().variance, 1.0);
        assert_eq!(s.get("FP1-F7").unwrap().mean, 4.0);
    }
}
