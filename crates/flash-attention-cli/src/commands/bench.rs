use std::time::{Duration, Instant};

use flash_attention::kernels::ulp::{allclose, max_abs_diff};
use flash_attention::{Backend, DType, Element, KernelConfig, Tensor, forward_with};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::random::normal_tensor;

pub struct BenchArgs {
    /// `[batch, heads, seq, dim]`, shared by q, k and v.
    pub shape: [usize; 4],
    pub seed: u64,
    pub atol: f64,
    pub dtype: DType,
}

pub fn run(config: &KernelConfig, args: &BenchArgs) -> Result<(), Box<dyn std::error::Error>> {
    match args.dtype {
        DType::F32 => bench::<f32>(config, args),
        DType::F64 => bench::<f64>(config, args),
    }
}

fn timed<T: Element>(
    config: &KernelConfig,
    backend: Backend,
    (q, k, v): (&Tensor<T>, &Tensor<T>, &Tensor<T>),
) -> Result<(Tensor<T>, Duration), Box<dyn std::error::Error>> {
    let config = config.clone().with_backend(backend);
    let start = Instant::now();
    let out = forward_with(&config, q, k, v)?;
    Ok((out, start.elapsed()))
}

fn bench<T: Element>(config: &KernelConfig, args: &BenchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let q = normal_tensor::<T, _>(&mut rng, &args.shape)?;
    let k = normal_tensor::<T, _>(&mut rng, &args.shape)?;
    let v = normal_tensor::<T, _>(&mut rng, &args.shape)?;
    log::info!(
        "bench inputs: shape {:?}, dtype {}, seed {}",
        args.shape,
        args.dtype,
        args.seed
    );

    println!("q, k, v: {:?} {}", args.shape, args.dtype);
    let (naive, naive_time) = timed(config, Backend::Naive, (&q, &k, &v))?;
    println!("naive attention: {naive_time:?}");
    let (flash, flash_time) = timed(config, Backend::Flash, (&q, &k, &v))?;
    println!(
        "flash attention: {flash_time:?} (tile {}, {})",
        config.tile_size,
        if config.parallel { "parallel" } else { "sequential" }
    );

    let (a, b) = (flash.to_vec(), naive.to_vec());
    let ok = allclose(&a, &b, 0.0, args.atol);
    println!("max abs diff: {:e}", max_abs_diff(&a, &b));
    println!("attn values sanity check: {ok} (rtol=0, atol={})", args.atol);

    if ok {
        Ok(())
    } else {
        Err(format!("flash output differs from naive beyond atol={}", args.atol).into())
    }
}
