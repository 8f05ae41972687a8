use cre_memo_builder::{BigQueryClient, GeminiClient, MemoSynthesizer, UnderwritingConfig};
use dotenv::dotenv;
use std::error::Error;
use std::io::{self, Read};

fn read_input() -> Result<String, Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args.join(" "));
    }

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let config = UnderwritingConfig::from_env()?;
    let input = read_input()?;

    if input.trim().is_empty() {
        return Err("The provided input is empty.".into());
    }

    println!("🏢 Preparing underwriting memo with model {}...\n", config.model);

    let synthesizer = MemoSynthesizer::new(
        BigQueryClient::from_config(&config)?,
        GeminiClient::from_config(&config),
        &config,
    );

    match synthesizer.synthesize(&input).await {
        Ok(memo) => {
            println!("{}", memo);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            Err(e.into())
        }
    }
}
