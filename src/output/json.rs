use anyhow::Result;
use serde::Serialize;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::ranking::rank;
    use crate::Candidate;

    #[test]
    fn renders_currency_as_strings() {
        let ranked = rank(&[Candidate::new("roof", dec!(1250.456), 10.0)]);
        let rendered = render_json(&ranked).expect("serializable");
        assert!(rendered.contains("\"cost\": \"1250.46\""));
        assert!(rendered.contains("\"rank\": 1"));
    }
}
