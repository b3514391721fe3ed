/*!
# Saving simulator output to CSV

Enable via the `csv` feature. Every file starts with a header row; value columns are named
`dim_0`, `dim_1`, and so on, in sample-row order.
*/

use ndarray::{Array2, Array3, Axis};
use std::error::Error;
use std::fs::File;
use std::path::Path;

use csv::Writer;

fn dim_headers(n_dims: usize) -> impl Iterator<Item = String> {
    (0..n_dims).map(|i| format!("dim_{}", i))
}

/**
Saves the rows of one simulator run (sample × column) as a CSV file with a leading `sample`
index column.

# Examples

```rust
use geweke_mcmc::io::csv::save_csv;
use ndarray::arr2;

let data = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
save_csv(&data, "/tmp/forward.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_csv<T: std::fmt::Display, P: AsRef<Path>>(
    data: &Array2<T>,
    filename: P,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);

    let mut header = vec!["sample".to_string()];
    header.extend(dim_headers(data.ncols()));
    wtr.write_record(&header)?;

    for (sample_idx, sample) in data.axis_iter(Axis(0)).enumerate() {
        let mut row = vec![sample_idx.to_string()];
        row.extend(sample.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/**
Saves several chains (chain × sample × column), as returned by
[`GewekeSampler::sample_sc_chains`](crate::sampler::GewekeSampler::sample_sc_chains), with
leading `chain` and `sample` index columns.
*/
pub fn save_csv_chains<T: std::fmt::Display, P: AsRef<Path>>(
    data: &Array3<T>,
    filename: P,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(File::create(filename)?);

    let mut header = vec!["chain".to_string(), "sample".to_string()];
    header.extend(dim_headers(data.shape()[2]));
    wtr.write_record(&header)?;

    for (chain_idx, chain) in data.axis_iter(Axis(0)).enumerate() {
        for (sample_idx, sample) in chain.axis_iter(Axis(0)).enumerate() {
            let mut row = vec![chain_idx.to_string(), sample_idx.to_string()];
            row.extend(sample.iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::Reader;
    use ndarray::{arr2, arr3};
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_csv_empty() {
        let data = Array2::<f64>::zeros((0, 0));
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_csv(&data, file.path()).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.trim(), "sample");
    }

    #[test]
    fn test_save_csv_rows() {
        let data = arr2(&[[1.5, -2.0], [3.0, 4.25]]);
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_csv(&data, file.path()).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
sample,dim_0,dim_1
0,1.5,-2
1,3,4.25";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_save_csv_chains_multi_chain() {
        let data = arr3(&[[[1, 2], [3, 4]], [[10, 20], [30, 40]]]);
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_csv_chains(&data, file.path()).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
chain,sample,dim_0,dim_1
0,0,1,2
0,1,3,4
1,0,10,20
1,1,30,40";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_save_csv_values_read_back() {
        let data = arr2(&[[0.1, 1e-12], [f64::MAX, -7.0]]);
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_csv(&data, file.path()).unwrap();

        let mut rdr = Reader::from_path(file.path()).unwrap();
        let rows: Vec<Vec<f64>> = rdr
            .records()
            .map(|r| r.unwrap().iter().skip(1).map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows, vec![vec![0.1, 1e-12], vec![f64::MAX, -7.0]]);
    }

    #[test]
    fn test_save_csv_bad_path() {
        let data = arr2(&[[1.0]]);
        assert!(save_csv(&data, "/nonexistent-dir/out.csv").is_err());
    }
}
