use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};

use crate::error::ForgeError;

/// Default Sui framework revision referenced from `Move.toml`.
pub const DEFAULT_FRAMEWORK_VERSION: &str = "1.22.0";

/// `coin::mint_and_transfer` takes a `u64` amount.
const MAX_RAW_SUPPLY: u64 = u64::MAX;

/// Decimal digits of `u64::MAX`.
const MAX_RAW_DIGITS: i128 = 20;

/// Parameters describing a new fungible token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Human-readable supply as a decimal string, e.g. `"1000000"` or `"12.5"`.
    pub initial_supply: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub toolchain_version: Option<String>,
}

impl TokenParams {
    /// Check the supply and compute its raw (smallest-unit) value.
    pub fn validate(&self) -> Result<BigInt, ForgeError> {
        if self.name.trim().is_empty() {
            return Err(ForgeError::InvalidParams("name must not be empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(ForgeError::InvalidParams("symbol must not be empty".into()));
        }
        let supply = parse_supply(&self.initial_supply)?;
        let raw = raw_initial_supply(&supply, self.decimals)?;
        if raw > BigInt::from(MAX_RAW_SUPPLY) {
            return Err(ForgeError::InvalidParams(format!(
                "raw initial supply {raw} exceeds u64::MAX"
            )));
        }
        Ok(raw)
    }

    /// Framework version for the manifest, falling back to the default.
    pub fn framework_version(&self) -> &str {
        self.toolchain_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_FRAMEWORK_VERSION)
    }
}

/// Parse a non-negative decimal supply string.
pub fn parse_supply(text: &str) -> Result<BigDecimal, ForgeError> {
    let supply = BigDecimal::from_str(text.trim()).map_err(|e| {
        ForgeError::InvalidParams(format!("initial supply {text:?} is not a decimal: {e}"))
    })?;
    let (digits, _) = supply.as_bigint_and_exponent();
    if digits.sign() == Sign::Minus {
        return Err(ForgeError::InvalidParams(format!(
            "initial supply must be non-negative, got {text}"
        )));
    }
    Ok(supply)
}

/// `floor(supply × 10^decimals)` in exact integer arithmetic.
///
/// `supply` must be non-negative, so truncating division is a floor. Values
/// that cannot fit in 20 digits are rejected before any power of ten is
/// computed, so the work is bounded by the length of the input text.
pub fn raw_initial_supply(supply: &BigDecimal, decimals: u8) -> Result<BigInt, ForgeError> {
    // supply == digits × 10^(-scale)
    let (digits, scale) = supply.as_bigint_and_exponent();
    if digits.sign() == Sign::NoSign {
        return Ok(BigInt::from(0u8));
    }
    let digit_count = digits.magnitude().to_string().len() as i128;
    let shift = i128::from(decimals) - i128::from(scale);
    let ten = BigInt::from(10u8);

    if shift >= 0 {
        if digit_count + shift > MAX_RAW_DIGITS {
            return Err(ForgeError::InvalidParams(format!(
                "raw initial supply has {} digits and exceeds u64::MAX",
                digit_count + shift
            )));
        }
        Ok(digits * ten.pow(power(shift)?))
    } else {
        let dropped = -shift;
        if dropped >= digit_count {
            return Ok(BigInt::from(0u8));
        }
        Ok(digits / ten.pow(power(dropped)?))
    }
}

fn power(exponent: i128) -> Result<u32, ForgeError> {
    u32::try_from(exponent).map_err(|_| {
        ForgeError::InvalidParams(format!("supply exponent {exponent} is out of range"))
    })
}

/// Render free text as a Move byte-string literal (`b"..."`).
///
/// Printable ASCII is embedded as-is; quotes, backslashes, control characters
/// and every byte of a non-ASCII character are written as `\xHH`, so the
/// on-chain bytes are exactly the UTF-8 encoding of `text`.
pub fn move_byte_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 3);
    out.push_str("b\"");
    for byte in text.bytes() {
        match byte {
            b'"' | b'\\' => {
                let _ = write!(out, "\\x{byte:02x}");
            }
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push('"');
    out
}

/// Text safe to place inside a `//` or `///` comment.
fn comment_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Render the Move source of the coin module.
pub fn render_contract_source(params: &TokenParams, module_name: &str, raw_supply: &BigInt) -> String {
    let witness = module_name.to_uppercase();
    let display_name = comment_text(&params.name);
    let display_supply = comment_text(&params.initial_supply);
    let decimals = params.decimals;
    let symbol = move_byte_string(&params.symbol);
    let name = move_byte_string(&params.name);
    let description = move_byte_string(&params.description);
    let icon_url = move_byte_string(&params.image_url);

    format!(
        r#"module {module_name}::{module_name} {{
    use std::option;
    use sui::coin;
    use sui::transfer;
    use sui::tx_context::{{Self, TxContext}};
    use sui::url;

    /// Witness struct for the {display_name} coin. Matches the module name in uppercase.
    public struct {witness} has drop {{}}

    /// Module initializer called once on module publish.
    fun init(witness: {witness}, ctx: &mut TxContext) {{
        let (mut treasury, metadata) = coin::create_currency(
            witness,
            {decimals},
            {symbol},
            {name},
            {description},
            option::some(url::new_unsafe_from_bytes({icon_url})),
            ctx
        );

        transfer::public_freeze_object(metadata);

        // {display_supply} tokens with {decimals} decimals
        let initial_amount = {raw_supply};
        let deployer = tx_context::sender(ctx);
        coin::mint_and_transfer(&mut treasury, initial_amount, deployer, ctx);

        transfer::public_transfer(treasury, deployer);
    }}
}}
"#
    )
}

/// Render `Move.toml` for the generated package.
pub fn render_manifest(module_name: &str, framework_version: &str) -> String {
    format!(
        r#"[package]
name = "{module_name}"
version = "0.0.1"

[dependencies]
Sui = {{ git = "https://github.com/MystenLabs/sui.git", subdir = "crates/sui-framework/packages/sui-framework", rev = "framework/{framework_version}" }}

[addresses]
{module_name} = "0x0"
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(supply: &str, decimals: u8) -> TokenParams {
        TokenParams {
            name: "My Cool Token".into(),
            symbol: "COOL".into(),
            decimals,
            initial_supply: supply.into(),
            description: "x".into(),
            image_url: "http://x".into(),
            output_dir: None,
            toolchain_version: None,
        }
    }

    fn raw(supply: &str, decimals: u8) -> BigInt {
        raw_initial_supply(&parse_supply(supply).unwrap(), decimals).unwrap()
    }

    #[test]
    fn scenario_supply_scales_by_decimals() {
        assert_eq!(raw("1000000", 9), BigInt::from(1_000_000_000_000_000u64));
        assert_eq!(params("1000000", 9).validate().unwrap(), BigInt::from(1_000_000_000_000_000u64));
    }

    #[test]
    fn fractional_supply_is_floored() {
        assert_eq!(raw("12.3456", 2), BigInt::from(1234));
        assert_eq!(raw("0.999", 0), BigInt::from(0));
        assert_eq!(raw("1.5", 0), BigInt::from(1));
    }

    #[test]
    fn zero_decimals_and_zero_supply() {
        assert_eq!(raw("0", 18), BigInt::from(0));
        assert_eq!(raw("7", 0), BigInt::from(7));
    }

    #[test]
    fn large_supplies_are_exact() {
        assert_eq!(raw("18446744073.709551615", 9), BigInt::from(u64::MAX));
        assert_eq!(
            raw("12345678901.234567891", 9),
            BigInt::from(12_345_678_901_234_567_891u64)
        );
        assert!(params("18446744073.709551616", 9).validate().is_err());
    }

    #[test]
    fn float_arithmetic_diverges_where_exact_does_not() {
        // 2^53 + 1 has no f64 representation.
        let supply = "9007199254.740993";
        let exact = raw(supply, 9);
        assert_eq!(exact, BigInt::from(9_007_199_254_740_993u64));

        let float = (supply.parse::<f64>().unwrap() * 10f64.powi(9)).floor();
        let float_as_int = BigInt::from_str(&format!("{float:.0}")).unwrap();
        assert_ne!(exact, float_as_int);
    }

    #[test]
    fn huge_positive_exponent_is_rejected_without_expanding() {
        for supply in ["1e4294967296", "1e100000000", "1e21"] {
            let err = params(supply, 0).validate().unwrap_err();
            assert!(
                matches!(&err, ForgeError::InvalidParams(m) if m.contains("u64::MAX")),
                "{supply}: {err}"
            );
        }
    }

    #[test]
    fn huge_negative_exponent_floors_to_zero() {
        assert_eq!(raw("1e-4294967296", 0), BigInt::from(0));
        assert_eq!(raw("123e-100000000", 18), BigInt::from(0));
        assert_eq!(params("1e-4294967296", 9).validate().unwrap(), BigInt::from(0));
        assert_eq!(raw("5e-3", 2), BigInt::from(0));
        assert_eq!(raw("25e-3", 2), BigInt::from(2));
    }

    #[test]
    fn zero_with_any_exponent_is_zero() {
        assert_eq!(raw("0e4294967296", 18), BigInt::from(0));
        assert_eq!(raw("0.000", 9), BigInt::from(0));
    }

    #[test]
    fn negative_supply_is_rejected() {
        let err = params("-1", 9).validate().unwrap_err();
        assert!(matches!(err, ForgeError::InvalidParams(_)));
    }

    #[test]
    fn non_numeric_supply_is_rejected() {
        assert!(params("lots", 9).validate().is_err());
    }

    #[test]
    fn supply_beyond_u64_is_rejected_for_rendering() {
        let err = params("1000000000000", 9).validate().unwrap_err();
        assert!(err.to_string().contains("u64::MAX"));
    }

    #[test]
    fn contract_embeds_witness_decimals_and_raw_supply() {
        let p = params("1000000", 9);
        let raw = p.validate().unwrap();
        let source = render_contract_source(&p, "my_cool_token", &raw);

        assert!(source.starts_with("module my_cool_token::my_cool_token {"));
        assert!(source.contains("public struct MY_COOL_TOKEN has drop {}"));
        assert!(source.contains("fun init(witness: MY_COOL_TOKEN, ctx: &mut TxContext)"));
        assert!(source.contains("            9,\n"));
        assert!(source.contains("let initial_amount = 1000000000000000;"));
        assert!(source.contains("b\"COOL\""));
        assert!(source.contains("url::new_unsafe_from_bytes(b\"http://x\")"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let p = params("42", 6);
        let raw = p.validate().unwrap();
        assert_eq!(
            render_contract_source(&p, "my_cool_token", &raw),
            render_contract_source(&p, "my_cool_token", &raw)
        );
    }

    #[test]
    fn byte_strings_escape_quotes_and_non_ascii() {
        assert_eq!(move_byte_string("plain text"), "b\"plain text\"");
        assert_eq!(move_byte_string("say \"hi\""), "b\"say \\x22hi\\x22\"");
        assert_eq!(move_byte_string("a\\b"), "b\"a\\x5cb\"");
        assert_eq!(move_byte_string("é"), "b\"\\xc3\\xa9\"");
        assert_eq!(move_byte_string("line\nbreak"), "b\"line\\x0abreak\"");
    }

    #[test]
    fn hostile_description_cannot_break_out_of_literal() {
        let mut p = params("1", 0);
        p.description = "\", ctx); abort 0; //".into();
        p.name = "Evil\nToken".into();
        let raw = p.validate().unwrap();
        let source = render_contract_source(&p, "evil_token", &raw);
        assert!(!source.contains("b\"\", ctx);"));
        assert!(source.contains("\\x22, ctx); abort 0; //"));
        assert!(source.contains("/// Witness struct for the Evil Token coin."));
    }

    #[test]
    fn manifest_pins_framework_and_placeholder_address() {
        let toml = render_manifest("my_cool_token", "1.22.0");
        assert!(toml.contains("name = \"my_cool_token\""));
        assert!(toml.contains("rev = \"framework/1.22.0\""));
        assert!(toml.contains("my_cool_token = \"0x0\""));
    }

    #[test]
    fn framework_version_defaults() {
        let mut p = params("1", 0);
        assert_eq!(p.framework_version(), DEFAULT_FRAMEWORK_VERSION);
        p.toolchain_version = Some("1.30.1".into());
        assert_eq!(p.framework_version(), "1.30.1");
    }
}
