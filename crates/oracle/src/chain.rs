use std::fmt;

/// Ordered list of model identifiers tried left to right for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("model chain is empty")]
pub struct EmptyChainError;

impl ModelChain {
    /// Build a chain, dropping blank entries. At least one model must
    /// remain.
    pub fn new<I, S>(models: I) -> Result<Self, EmptyChainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.into().trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(EmptyChainError);
        }
        Ok(Self { models })
    }

    /// Parse a comma-separated list such as `"gpt-4o, gpt-4o-mini"`.
    pub fn parse(list: &str) -> Result<Self, EmptyChainError> {
        Self::new(list.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl fmt::Display for ModelChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.models.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_list_in_order() {
        let chain = ModelChain::parse(" a ,b,, c ").unwrap();
        assert_eq!(chain.iter().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(chain.to_string(), "a,b,c");
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(ModelChain::parse(" , "), Err(EmptyChainError));
        assert_eq!(ModelChain::new(Vec::<String>::new()), Err(EmptyChainError));
    }
}
