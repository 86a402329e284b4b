use dsmr::{obis_utils::get_obis_description, parse_with_config, Config, Telegram};
use log::{debug, error, info, warn};
use serde_json::json;
use std::error::Error;
use std::io::Read;
use std::{env, fs, io, process};

fn read_input(arg: Option<String>) -> io::Result<Vec<u8>> {
    match arg.as_deref() {
        Some(path) if path != "-" => {
            info!("Reading telegram from {}", path);
            fs::read(path)
        }
        _ => {
            debug!("Reading telegram from stdin");
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn telegram_to_json(telegram: &Telegram) -> serde_json::Result<serde_json::Value> {
    let mut objects = serde_json::Map::new();
    for object in &telegram.objects {
        let key = object.obis.to_string();
        if objects.contains_key(&key) {
            warn!("Object {} appears more than once, keeping the first", key);
            continue;
        }

        let value = serde_json::to_value(&object.value)?;
        let description = get_obis_description(&key);
        objects.insert(key, json!({ "value": value, "description": description }));
    }

    Ok(json!({
        "header": telegram.header.value,
        "manufacturer": telegram.header.manufacturer(),
        "checksum": telegram.checksum(),
        "objects": objects,
    }))
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match env::var("DSMR_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config::default(),
    };

    let data = read_input(env::args().nth(1))?;
    let telegram = parse_with_config(&data, &config)?;
    info!("Decoded telegram from {} with {} objects", telegram.header.value, telegram.objects.len());

    println!("{}", serde_json::to_string_pretty(&telegram_to_json(&telegram)?)?);
    Ok(())
}

fn main() {
    // Initialize logging
    let default_filter = std::env::var("DSMR_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    if let Err(err) = run() {
        error!("{}", err);
        process::exit(1);
    }
}
