use flash_attention::kernels::ulp::{max_abs_diff, max_ulp_distance};
use flash_attention::{Backend, KernelConfig, Tensor, forward_with};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::random::normal_tensor;

/// One randomly drawn problem.
struct Trial {
    batch_dims: Vec<usize>,
    lq: usize,
    lk: usize,
    d: usize,
    dv: usize,
    tile_size: usize,
}

impl Trial {
    fn draw(rng: &mut StdRng, max_rank: usize) -> Self {
        let rank = rng.gen_range(2..=max_rank.max(2));
        Self {
            batch_dims: (0..rank - 2).map(|_| rng.gen_range(1..=3)).collect(),
            lq: rng.gen_range(1..=9),
            lk: rng.gen_range(1..=40),
            d: rng.gen_range(0..=16),
            dv: rng.gen_range(1..=8),
            tile_size: rng.gen_range(1..=8),
        }
    }

    fn shape(&self, rows: usize, cols: usize) -> Vec<usize> {
        let mut s = self.batch_dims.clone();
        s.extend([rows, cols]);
        s
    }
}

/// Failure descriptions for one trial; empty when every comparison holds.
fn run_trial(
    config: &KernelConfig,
    rng: &mut StdRng,
    trial: &Trial,
    atol: f64,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let q: Tensor<f32> = normal_tensor(rng, &trial.shape(trial.lq, trial.d))?;
    // k is stored as [..., D, Lk] and read through a transposed view.
    let k_store: Tensor<f32> = normal_tensor(rng, &trial.shape(trial.d, trial.lk))?;
    let rank = k_store.rank();
    let k = k_store.transpose(rank - 2, rank - 1)?;
    let v: Tensor<f32> = normal_tensor(rng, &trial.shape(trial.lk, trial.dv))?;

    let flash_cfg = KernelConfig {
        tile_size: trial.tile_size,
        min_rows_per_task: 1,
        ..config.clone().with_backend(Backend::Flash)
    };
    let naive_cfg = flash_cfg.clone().with_backend(Backend::Naive);

    let flash = forward_with(&flash_cfg, &q, &k, &v)?.to_vec();
    let flash_seq = forward_with(&flash_cfg.clone().sequential(), &q, &k, &v)?.to_vec();
    let naive = forward_with(&naive_cfg, &q, &k, &v)?.to_vec();
    let packed = forward_with(&flash_cfg, &q, &k.to_contiguous()?, &v)?.to_vec();

    let mut failures = Vec::new();
    let diff = max_abs_diff(&flash, &naive);
    if diff.is_nan() || diff > atol {
        failures.push(format!("flash vs naive: max abs diff {diff:e} > {atol:e}"));
    }
    let ulps = max_ulp_distance(&flash, &flash_seq);
    if ulps != 0 {
        failures.push(format!("parallel and sequential flash outputs differ by {ulps} ulp"));
    }
    let ulps = max_ulp_distance(&flash, &packed);
    if ulps != 0 {
        failures.push(format!("strided and packed k differ by {ulps} ulp"));
    }
    Ok(failures)
}

pub fn run(
    config: &KernelConfig,
    trials: usize,
    seed: u64,
    max_rank: usize,
    atol: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut failed = 0usize;

    for i in 0..trials {
        let trial = Trial::draw(&mut rng, max_rank);
        log::debug!(
            "trial {i}: batch {:?}, Lq {}, Lk {}, D {}, Dv {}, tile {}",
            trial.batch_dims,
            trial.lq,
            trial.lk,
            trial.d,
            trial.dv,
            trial.tile_size
        );
        let failures = run_trial(config, &mut rng, &trial, atol)?;
        if !failures.is_empty() {
            failed += 1;
            for f in &failures {
                println!(
                    "FAIL trial {i} (q {:?}, Lk {}, tile {}): {f}",
                    trial.shape(trial.lq, trial.d),
                    trial.lk,
                    trial.tile_size
                );
            }
        }
    }

    println!("{} trial(s), {} passed, {failed} failed", trials, trials - failed);
    if failed == 0 {
        Ok(())
    } else {
        Err(format!("{failed} of {trials} trial(s) failed").into())
    }
}
