//! Workbook part (`xl/workbook.xml` + `xl/_rels/workbook.xml.rels`)
//!
//! Exposes the sheet list in document order (name, id, visibility, target
//! path) and the workbook-wide date system.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XlsxError, XlsxResult};
use crate::package::{parse_relationships, OpcPackage};

const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";

/// Which serial-date epoch the workbook uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    /// Serial 1 = 1900-01-01, with the phantom 1900-02-29
    #[default]
    Date1900,
    /// Serial 0 = 1904-01-01 (classic Mac Excel)
    Date1904,
}

/// Workbook-wide properties relevant to conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkbookProperties {
    pub date_system: DateSystem,
}

/// One `<sheet>` entry from the workbook part.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetInfo {
    /// Sheet display name
    pub name: String,
    /// `sheetId` attribute
    pub sheet_id: u32,
    /// `r:id` linking the sheet to its part
    pub relationship_id: String,
    /// Part path resolved through the workbook relationships
    pub target: String,
    /// False iff the sheet state is `hidden` or `veryHidden`
    pub visible: bool,
}

/// Parsed workbook structure.
pub struct Workbook {
    sheets: Vec<SheetInfo>,
    relationships: HashMap<String, String>,
    properties: WorkbookProperties,
}

impl Workbook {
    /// Parse the workbook part and its relationships.
    pub fn open(package: &mut OpcPackage) -> XlsxResult<Self> {
        let workbook_path = package.find_workbook_part()?;
        let workbook_xml = package.zip_mut().read_entry(&workbook_path)?;
        let (mut sheets, properties) = parse_workbook_xml(&workbook_xml)?;

        if !package.zip().has_entry(WORKBOOK_RELS_PATH) {
            return Err(XlsxError::MissingPart(WORKBOOK_RELS_PATH.into()));
        }
        let rels_xml = package.zip_mut().read_entry(WORKBOOK_RELS_PATH)?;
        let relationships: HashMap<String, String> = parse_relationships(&rels_xml)?
            .into_iter()
            .map(|r| (r.id, r.target))
            .collect();

        for sheet in &mut sheets {
            match relationships.get(&sheet.relationship_id) {
                Some(target) => sheet.target = target.clone(),
                None => {
                    return Err(XlsxError::MissingRelationship(format!(
                        "sheet '{}' references unknown r:id '{}'",
                        sheet.name, sheet.relationship_id
                    )));
                }
            }
        }

        Ok(Self {
            sheets,
            relationships,
            properties,
        })
    }

    /// All sheets, in document order.
    pub fn sheets(&self) -> &[SheetInfo] {
        &self.sheets
    }

    /// Find a sheet by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&SheetInfo> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Find a sheet by 0-based position.
    pub fn find_by_index(&self, index: usize) -> Option<&SheetInfo> {
        self.sheets.get(index)
    }

    /// Number of sheets.
    pub fn count(&self) -> usize {
        self.sheets.len()
    }

    /// Workbook properties.
    pub fn properties(&self) -> &WorkbookProperties {
        &self.properties
    }

    /// The workbook's serial-date epoch.
    pub fn date_system(&self) -> DateSystem {
        self.properties.date_system
    }

    /// Resolve a workbook relationship id to its target path.
    pub fn resolve_relationship(&self, relationship_id: &str) -> XlsxResult<&str> {
        self.relationships
            .get(relationship_id)
            .map(String::as_str)
            .ok_or_else(|| XlsxError::MissingRelationship(relationship_id.to_string()))
    }
}

fn parse_workbook_xml(xml: &[u8]) -> XlsxResult<(Vec<SheetInfo>, WorkbookProperties)> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut properties = WorkbookProperties::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) => match e.name().as_ref() {
                b"workbookPr" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"date1904" {
                            if let Ok(value) = attr.unescape_value() {
                                if value.as_ref() == "1" || value.as_ref() == "true" {
                                    properties.date_system = DateSystem::Date1904;
                                }
                            }
                        }
                    }
                }
                b"sheet" => {
                    let mut name = None;
                    let mut sheet_id = 0u32;
                    let mut relationship_id = None;
                    let mut visible = true;

                    for attr in e.attributes().flatten() {
                        let value = match attr.unescape_value() {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        match attr.key.as_ref() {
                            b"name" => name = Some(value.to_string()),
                            b"sheetId" => sheet_id = value.parse().unwrap_or(0),
                            b"r:id" => relationship_id = Some(value.to_string()),
                            b"state" => {
                                visible = !matches!(value.as_ref(), "hidden" | "veryHidden");
                            }
                            _ => {}
                        }
                    }

                    if let (Some(name), Some(relationship_id)) = (name, relationship_id) {
                        sheets.push(SheetInfo {
                            name,
                            sheet_id,
                            relationship_id,
                            target: String::new(),
                            visible,
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, properties))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sheets_and_visibility() {
        let xml = br#"<?xml version="1.0"?>
            <workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
                      xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
                <sheets>
                    <sheet name="Data" sheetId="1" r:id="rId1"/>
                    <sheet name="Secret" sheetId="2" state="hidden" r:id="rId2"/>
                    <sheet name="Gone" sheetId="3" state="veryHidden" r:id="rId3"/>
                </sheets>
            </workbook>"#;

        let (sheets, props) = parse_workbook_xml(xml).unwrap();
        assert_eq!(sheets.len(), 3);
        assert_eq!(props.date_system, DateSystem::Date1900);

        assert_eq!(sheets[0].name, "Data");
        assert_eq!(sheets[0].sheet_id, 1);
        assert_eq!(sheets[0].relationship_id, "rId1");
        assert!(sheets[0].visible);

        assert!(!sheets[1].visible);
        assert!(!sheets[2].visible);
    }

    #[test]
    fn test_date1904_property() {
        let xml = br#"<workbook>
            <workbookPr date1904="1"/>
            <sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets>
        </workbook>"#;

        let (_, props) = parse_workbook_xml(xml).unwrap();
        assert_eq!(props.date_system, DateSystem::Date1904);
    }

    #[test]
    fn test_date1904_false_values() {
        let xml = br#"<workbook><workbookPr date1904="0"/></workbook>"#;
        let (_, props) = parse_workbook_xml(xml).unwrap();
        assert_eq!(props.date_system, DateSystem::Date1900);
    }

    #[test]
    fn test_sheet_without_rid_skipped() {
        let xml = br#"<workbook><sheets><sheet name="Orphan" sheetId="1"/></sheets></workbook>"#;
        let (sheets, _) = parse_workbook_xml(xml).unwrap();
        assert!(sheets.is_empty());
    }
}
