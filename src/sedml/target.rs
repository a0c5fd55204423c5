//! XPath target resolution
//!
//! Only the `@id` predicate of the addressed element matters to the pipeline, e.g.
//! `/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='AL']` addresses `AL`.

/// Id named by the last `[@id='...']` (or `[@id="..."]`) predicate of a target
#[must_use]
pub fn target_id(target: &str) -> Option<&str> {
    let start = target.rfind("[@id=")? + "[@id=".len();
    let rest = &target[start..];
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &rest[quote.len_utf8()..];
    let end = rest.find(quote)?;
    let id = &rest[..end];
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_and_double_quotes() {
        assert_eq!(
            target_id("/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='AL']"),
            Some("AL")
        );
        assert_eq!(
            target_id(r#"/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id="BLL"]"#),
            Some("BLL")
        );
    }

    #[test]
    fn test_attribute_suffix() {
        assert_eq!(
            target_id("/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='kf_0']/@value"),
            Some("kf_0")
        );
    }

    #[test]
    fn test_no_predicate() {
        assert_eq!(target_id("/sbml:sbml/sbml:model"), None);
        assert_eq!(target_id("/x[@id='']"), None);
        assert_eq!(target_id("/x[@id=AL]"), None);
    }
}
