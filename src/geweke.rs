//! Geweke test functions: first and second empirical moments of every column.

use ndarray::{Array2, ArrayView2, Axis};

/// Number of columns [`geweke_functions`] produces for `k` input columns.
pub fn geweke_function_count(k: usize) -> usize {
    k + k * (k + 1) / 2
}

/**
Projects a sample matrix onto its Geweke test functions.

The output holds the raw columns followed by the products `x_i * x_j` for every `j <= i`,
ordered by `i` and then `j`.

# Examples

```rust
use geweke_mcmc::geweke::geweke_functions;
use ndarray::array;

let f = geweke_functions(array![[2.0, 3.0]].view());
assert_eq!(f, array![[2.0, 3.0, 4.0, 6.0, 9.0]]);
```
*/
pub fn geweke_functions(samples: ArrayView2<f64>) -> Array2<f64> {
    let (n, p) = samples.dim();
    let mut out = Array2::zeros((n, geweke_function_count(p)));
    out.slice_mut(ndarray::s![.., ..p]).assign(&samples);
    let mut col = p;
    for i in 0..p {
        for j in 0..=i {
            let product = &samples.index_axis(Axis(1), i) * &samples.index_axis(Axis(1), j);
            out.index_axis_mut(Axis(1), col).assign(&product);
            col += 1;
        }
    }
    out
}
