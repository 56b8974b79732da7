//! CSDL/EDMX `$metadata` XML parsing: four recognized annotation terms per
//! field (§4.4 step 4).

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAnnotations {
    pub calculation: bool,
    pub summary: bool,
    pub global: bool,
    pub comment: Option<String>,
}

/// Parse `$metadata` CSDL XML into per-table, per-field annotations.
/// Unparseable XML yields an empty map rather than failing bootstrap (§4.4:
/// "Continue without annotations").
pub fn parse_metadata_annotations(xml: &str) -> HashMap<String, HashMap<String, FieldAnnotations>> {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(d) => d,
        Err(_) => return HashMap::new(),
    };

    let mut tables: HashMap<String, HashMap<String, FieldAnnotations>> = HashMap::new();

    for entity in doc.descendants().filter(|n| n.has_tag_name("EntityType")) {
        let Some(raw_name) = entity.attribute("Name") else { continue };
        // Entity-type names ending in an underscore are normalized by
        // stripping it (§4.4 step 4).
        let table_name = raw_name.strip_suffix('_').unwrap_or(raw_name).to_string();

        let mut fields = HashMap::new();
        for prop in entity.children().filter(|n| n.has_tag_name("Property")) {
            let Some(field_name) = prop.attribute("Name") else { continue };
            let mut ann = FieldAnnotations::default();

            for annotation in prop.children().filter(|n| n.has_tag_name("Annotation")) {
                let term = annotation.attribute("Term").unwrap_or("");
                if term.ends_with("Calculation") {
                    ann.calculation = annotation.attribute("Bool") == Some("true");
                } else if term.ends_with("Summary") {
                    ann.summary = annotation.attribute("Bool") == Some("true");
                } else if term.ends_with("Global") {
                    ann.global = annotation.attribute("Bool") == Some("true");
                } else if term.ends_with("FMComment") {
                    if let Some(s) = annotation.attribute("String") {
                        ann.comment = Some(s.to_string());
                    }
                }
            }

            fields.insert(field_name.to_string(), ann);
        }

        tables.insert(table_name, fields);
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="Invoices_">
        <Property Name="Notes" Type="Edm.String">
          <Annotation Term="FM.FMComment" String="internal note"/>
        </Property>
        <Property Name="TotalCalc" Type="Edm.Decimal">
          <Annotation Term="FM.Calculation" Bool="true"/>
        </Property>
        <Property Name="SummaryField" Type="Edm.Decimal">
          <Annotation Term="FM.Summary" Bool="false"/>
        </Property>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn strips_trailing_underscore_from_entity_name() {
        let tables = parse_metadata_annotations(SAMPLE_XML);
        assert!(tables.contains_key("Invoices"));
        assert!(!tables.contains_key("Invoices_"));
    }

    #[test]
    fn parses_fmcomment_as_description() {
        let tables = parse_metadata_annotations(SAMPLE_XML);
        assert_eq!(tables["Invoices"]["Notes"].comment.as_deref(), Some("internal note"));
    }

    #[test]
    fn calculation_true_is_recorded() {
        let tables = parse_metadata_annotations(SAMPLE_XML);
        assert!(tables["Invoices"]["TotalCalc"].calculation);
    }

    #[test]
    fn bool_false_literal_is_not_true() {
        let tables = parse_metadata_annotations(SAMPLE_XML);
        assert!(!tables["Invoices"]["SummaryField"].summary);
    }

    #[test]
    fn malformed_xml_yields_empty_map() {
        assert!(parse_metadata_annotations("<not valid").is_empty());
    }
}
