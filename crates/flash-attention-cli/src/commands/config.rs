use flash_attention::KernelConfig;

pub fn run(config: &KernelConfig) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
