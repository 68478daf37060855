//! Names of the engine operations the wallet layer invokes.

pub const REGISTER_USER: &str = "register_user";
pub const LOGIN: &str = "login";
pub const LOGIN_WITH_PIN: &str = "login_with_pin";
pub const SET_PIN: &str = "set_pin";
pub const GET_SUBACCOUNTS: &str = "get_subaccounts";
pub const GET_SETTINGS: &str = "get_settings";
pub const GET_AVAILABLE_CURRENCIES: &str = "get_available_currencies";
pub const GET_TWOFACTOR_CONFIG: &str = "get_twofactor_config";
pub const REFRESH_ASSETS: &str = "refresh_assets";
pub const CONVERT_AMOUNT: &str = "convert_amount";
pub const GET_MNEMONIC: &str = "get_mnemonic";
