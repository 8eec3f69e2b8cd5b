pub mod config;

pub use self::config::{
    MAX_BCRYPT_COST, MIN_BCRYPT_COST, MIN_SECRET_LEN, load_config, parse_config, validate_config,
};
