//! Functional annotation, stored in the `annot` sub-document of variant documents.
//!
//! Sequence Ontology terms are stored as their integer accession.  Polyphen and Sift
//! scores get dedicated fields so they can be filtered directly, all other protein
//! substitution scores go into `ps_score`.  The `xrefs` set collects every identifier
//! the annotation knows about (dbSNP id, gene names, Ensembl ids and explicit xrefs)
//! so that id and gene lookups only need to consult one field.

use indexmap::IndexSet;
use serde_json::Value;

use super::{
    get_f64, get_i32, get_objects, get_string, put_int, put_list, put_str, to_i32, Error,
};
use crate::{
    model::{ConsequenceType, Score, VariantAnnotation, Xref},
    storage::Document,
};

pub const CONSEQUENCE_TYPE_FIELD: &str = "ct";
pub const GENE_NAME_FIELD: &str = "gn";
pub const ENSEMBL_GENE_ID_FIELD: &str = "ensg";
pub const ENSEMBL_TRANSCRIPT_ID_FIELD: &str = "enst";
pub const RELATIVE_POS_FIELD: &str = "relPos";
pub const CODON_FIELD: &str = "codon";
pub const STRAND_FIELD: &str = "strand";
pub const BIOTYPE_FIELD: &str = "bt";
pub const C_DNA_POSITION_FIELD: &str = "cDnaPos";
pub const CDS_POSITION_FIELD: &str = "cdsPos";
pub const AA_POSITION_FIELD: &str = "aaPos";
pub const AA_CHANGE_FIELD: &str = "aaChange";
pub const SO_ACCESSION_FIELD: &str = "so";
pub const PROTEIN_SUBSTITUTION_SCORE_FIELD: &str = "ps_score";
pub const POLYPHEN_FIELD: &str = "polyphen";
pub const SIFT_FIELD: &str = "sift";
pub const XREFS_FIELD: &str = "xrefs";
pub const XREF_ID_FIELD: &str = "id";
pub const XREF_SOURCE_FIELD: &str = "src";
pub const CONSERVED_REGION_SCORE_FIELD: &str = "cr_score";
pub const SCORE_SCORE_FIELD: &str = "sc";
pub const SCORE_SOURCE_FIELD: &str = "src";
pub const SCORE_DESCRIPTION_FIELD: &str = "desc";
pub const CLINICAL_DATA_FIELD: &str = "clinicalData";

/// Score sources with dedicated fields.
pub const POLYPHEN_SOURCE: &str = "Polyphen";
pub const SIFT_SOURCE: &str = "Sift";

/// Xref source of the annotation id.
pub const DBSNP_SOURCE: &str = "dbSNP";

/// Sequence Ontology consequence terms and their accession numbers.
pub static SO_TERMS: &[(&str, i32)] = &[
    ("transcript_ablation", 1893),
    ("splice_acceptor_variant", 1574),
    ("splice_donor_variant", 1575),
    ("stop_gained", 1587),
    ("frameshift_variant", 1589),
    ("stop_lost", 1578),
    ("start_lost", 2012),
    ("initiator_codon_variant", 1582),
    ("transcript_amplification", 1889),
    ("inframe_insertion", 1821),
    ("inframe_deletion", 1822),
    ("missense_variant", 1583),
    ("protein_altering_variant", 1818),
    ("splice_region_variant", 1630),
    ("incomplete_terminal_codon_variant", 1626),
    ("stop_retained_variant", 1567),
    ("synonymous_variant", 1819),
    ("coding_sequence_variant", 1580),
    ("mature_miRNA_variant", 1620),
    ("5_prime_UTR_variant", 1623),
    ("3_prime_UTR_variant", 1624),
    ("non_coding_transcript_exon_variant", 1792),
    ("intron_variant", 1627),
    ("NMD_transcript_variant", 1621),
    ("non_coding_transcript_variant", 1619),
    ("upstream_gene_variant", 1631),
    ("downstream_gene_variant", 1632),
    ("TFBS_ablation", 1895),
    ("TFBS_amplification", 1892),
    ("TF_binding_site_variant", 1782),
    ("regulatory_region_ablation", 1894),
    ("regulatory_region_amplification", 1891),
    ("feature_elongation", 1907),
    ("regulatory_region_variant", 1566),
    ("feature_truncation", 1906),
    ("intergenic_variant", 1628),
];

pub fn so_term_to_accession(term: &str) -> Option<i32> {
    SO_TERMS
        .iter()
        .find(|(name, _)| *name == term)
        .map(|(_, accession)| *accession)
}

pub fn so_accession_to_term(accession: i32) -> Option<&'static str> {
    SO_TERMS
        .iter()
        .find(|(_, acc)| *acc == accession)
        .map(|(name, _)| *name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationCodec;

impl AnnotationCodec {
    pub fn encode(&self, annotation: &VariantAnnotation) -> Document {
        let mut document = Document::new();
        let mut xrefs = IndexSet::new();

        if let Some(id) = annotation.id.as_ref().filter(|id| !id.is_empty()) {
            xrefs.insert(Xref::new(id, DBSNP_SOURCE));
        }

        let mut cts = Vec::new();
        for consequence_type in &annotation.consequence_types {
            cts.push(Value::Object(self.encode_consequence_type(consequence_type)));

            for (id, src) in [
                (&consequence_type.gene_name, "HGNC"),
                (&consequence_type.ensembl_gene_id, "ensemblGene"),
                (&consequence_type.ensembl_transcript_id, "ensemblTranscript"),
            ] {
                if !id.is_empty() {
                    xrefs.insert(Xref::new(id, src));
                }
            }
        }
        put_list(&mut document, CONSEQUENCE_TYPE_FIELD, cts);

        put_list(
            &mut document,
            CONSERVED_REGION_SCORE_FIELD,
            annotation
                .conserved_region_scores
                .iter()
                .map(|score| {
                    Value::Object(encode_score(
                        score.score,
                        &score.source,
                        &score.description,
                    ))
                })
                .collect(),
        );

        xrefs.extend(annotation.xrefs.iter().cloned());
        put_list(
            &mut document,
            XREFS_FIELD,
            xrefs
                .into_iter()
                .map(|xref| {
                    let mut document = Document::new();
                    document.insert(XREF_ID_FIELD.into(), xref.id.into());
                    document.insert(XREF_SOURCE_FIELD.into(), xref.src.into());
                    Value::Object(document)
                })
                .collect(),
        );

        let clinical_data = annotation
            .clinical_data
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Document>();
        if !clinical_data.is_empty() {
            document.insert(CLINICAL_DATA_FIELD.into(), Value::Object(clinical_data));
        }

        document
    }

    fn encode_consequence_type(&self, consequence_type: &ConsequenceType) -> Document {
        let mut ct = Document::new();
        put_str(&mut ct, GENE_NAME_FIELD, &consequence_type.gene_name);
        put_str(&mut ct, ENSEMBL_GENE_ID_FIELD, &consequence_type.ensembl_gene_id);
        put_str(
            &mut ct,
            ENSEMBL_TRANSCRIPT_ID_FIELD,
            &consequence_type.ensembl_transcript_id,
        );
        put_int(&mut ct, RELATIVE_POS_FIELD, consequence_type.relative_position);
        put_str(&mut ct, CODON_FIELD, &consequence_type.codon);
        put_str(&mut ct, STRAND_FIELD, &consequence_type.strand);
        put_str(&mut ct, BIOTYPE_FIELD, &consequence_type.biotype);
        put_int(&mut ct, C_DNA_POSITION_FIELD, consequence_type.c_dna_position);
        put_int(&mut ct, CDS_POSITION_FIELD, consequence_type.cds_position);
        put_int(&mut ct, AA_POSITION_FIELD, consequence_type.aa_position);
        put_str(&mut ct, AA_CHANGE_FIELD, &consequence_type.aa_change);

        let mut accessions = Vec::new();
        for term in &consequence_type.so_terms {
            match so_term_to_accession(term) {
                Some(accession) => accessions.push(Value::from(accession)),
                None => tracing::warn!("unknown Sequence Ontology term {:?}, skipping", term),
            }
        }
        put_list(&mut ct, SO_ACCESSION_FIELD, accessions);

        let mut scores = Vec::new();
        for score in &consequence_type.protein_substitution_scores {
            match score.source.as_str() {
                POLYPHEN_SOURCE => {
                    ct.insert(
                        POLYPHEN_FIELD.into(),
                        Value::Object(encode_score(score.score, "", &score.description)),
                    );
                }
                SIFT_SOURCE => {
                    ct.insert(
                        SIFT_FIELD.into(),
                        Value::Object(encode_score(score.score, "", &score.description)),
                    );
                }
                _ => scores.push(Value::Object(encode_score(
                    score.score,
                    &score.source,
                    &score.description,
                ))),
            }
        }
        put_list(&mut ct, PROTEIN_SUBSTITUTION_SCORE_FIELD, scores);

        ct
    }

    /// Decode `annot`; coordinates are left for the caller to fill in.
    pub fn decode(&self, document: &Document) -> Result<VariantAnnotation, Error> {
        let consequence_types = get_objects(document, CONSEQUENCE_TYPE_FIELD)
            .into_iter()
            .map(|ct| self.decode_consequence_type(ct))
            .collect::<Result<Vec<_>, _>>()?;

        let xrefs = get_objects(document, XREFS_FIELD)
            .into_iter()
            .map(|xref| Xref {
                id: get_string(xref, XREF_ID_FIELD),
                src: get_string(xref, XREF_SOURCE_FIELD),
            })
            .collect::<Vec<_>>();
        let id = xrefs
            .iter()
            .find(|xref| xref.src == DBSNP_SOURCE)
            .map(|xref| xref.id.clone());

        let clinical_data = match document.get(CLINICAL_DATA_FIELD) {
            Some(Value::Object(data)) => data.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Default::default(),
        };

        Ok(VariantAnnotation {
            id,
            consequence_types,
            conserved_region_scores: get_objects(document, CONSERVED_REGION_SCORE_FIELD)
                .into_iter()
                .map(decode_score)
                .collect(),
            xrefs,
            clinical_data,
            ..Default::default()
        })
    }

    fn decode_consequence_type(&self, ct: &Document) -> Result<ConsequenceType, Error> {
        let accessions = match ct.get(SO_ACCESSION_FIELD) {
            Some(Value::Array(accessions)) => accessions.iter().collect::<Vec<_>>(),
            Some(accession) => vec![accession],
            None => Vec::new(),
        };
        let mut so_terms = Vec::with_capacity(accessions.len());
        for accession in accessions {
            let term = match accession.as_i64() {
                Some(acc) => so_accession_to_term(to_i32(SO_ACCESSION_FIELD, acc)?),
                None => None,
            };
            match term {
                Some(term) => so_terms.push(term.to_string()),
                None => tracing::warn!("unknown Sequence Ontology accession {}", accession),
            }
        }

        let mut protein_substitution_scores = get_objects(ct, PROTEIN_SUBSTITUTION_SCORE_FIELD)
            .into_iter()
            .map(decode_score)
            .collect::<Vec<_>>();
        for (field, source) in [(POLYPHEN_FIELD, POLYPHEN_SOURCE), (SIFT_FIELD, SIFT_SOURCE)] {
            if let Some(Value::Object(score)) = ct.get(field) {
                protein_substitution_scores.push(Score {
                    source: source.to_string(),
                    ..decode_score(score)
                });
            }
        }

        Ok(ConsequenceType {
            gene_name: get_string(ct, GENE_NAME_FIELD),
            ensembl_gene_id: get_string(ct, ENSEMBL_GENE_ID_FIELD),
            ensembl_transcript_id: get_string(ct, ENSEMBL_TRANSCRIPT_ID_FIELD),
            strand: get_string(ct, STRAND_FIELD),
            biotype: get_string(ct, BIOTYPE_FIELD),
            relative_position: get_i32(ct, RELATIVE_POS_FIELD, 0)?,
            c_dna_position: get_i32(ct, C_DNA_POSITION_FIELD, 0)?,
            cds_position: get_i32(ct, CDS_POSITION_FIELD, 0)?,
            aa_position: get_i32(ct, AA_POSITION_FIELD, 0)?,
            aa_change: get_string(ct, AA_CHANGE_FIELD),
            codon: get_string(ct, CODON_FIELD),
            so_terms,
            protein_substitution_scores,
        })
    }
}

fn encode_score(score: f64, source: &str, description: &str) -> Document {
    let mut document = Document::new();
    document.insert(SCORE_SCORE_FIELD.into(), Value::from(score));
    put_str(&mut document, SCORE_SOURCE_FIELD, source);
    put_str(&mut document, SCORE_DESCRIPTION_FIELD, description);
    document
}

fn decode_score(document: &Document) -> Score {
    Score {
        score: get_f64(document, SCORE_SCORE_FIELD, 0.0),
        source: get_string(document, SCORE_SOURCE_FIELD),
        description: get_string(document, SCORE_DESCRIPTION_FIELD),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;

    fn annotation() -> VariantAnnotation {
        VariantAnnotation {
            id: Some(String::from("rs666")),
            consequence_types: vec![ConsequenceType {
                gene_name: String::from("BRCA2"),
                ensembl_gene_id: String::from("ENSG00000139618"),
                ensembl_transcript_id: String::from("ENST00000380152"),
                biotype: String::from("protein_coding"),
                cds_position: 123,
                so_terms: vec![String::from("missense_variant")],
                protein_substitution_scores: vec![
                    Score::new(0.9, "Polyphen", "probably damaging"),
                    Score::new(0.01, "Sift", "deleterious"),
                    Score::new(0.5, "Other", ""),
                ],
                ..Default::default()
            }],
            conserved_region_scores: vec![Score::new(0.3, "phylop", "")],
            xrefs: vec![Xref::new("BRCA2", "HGNC"), Xref::new("P51587", "UniProt")],
            ..Default::default()
        }
    }

    #[test]
    fn encode() {
        let document = AnnotationCodec.encode(&annotation());

        assert_eq!(
            Value::Object(document),
            json!({
                "ct": [{
                    "gn": "BRCA2",
                    "ensg": "ENSG00000139618",
                    "enst": "ENST00000380152",
                    "bt": "protein_coding",
                    "cdsPos": 123,
                    "so": [1583],
                    "polyphen": {"sc": 0.9, "desc": "probably damaging"},
                    "sift": {"sc": 0.01, "desc": "deleterious"},
                    "ps_score": [{"sc": 0.5, "src": "Other"}]
                }],
                "cr_score": [{"sc": 0.3, "src": "phylop"}],
                "xrefs": [
                    {"id": "rs666", "src": "dbSNP"},
                    {"id": "BRCA2", "src": "HGNC"},
                    {"id": "ENSG00000139618", "src": "ensemblGene"},
                    {"id": "ENST00000380152", "src": "ensemblTranscript"},
                    {"id": "P51587", "src": "UniProt"}
                ]
            })
        );
    }

    #[test]
    fn decode_restores_scores_and_terms() -> Result<(), anyhow::Error> {
        let decoded = AnnotationCodec.decode(&AnnotationCodec.encode(&annotation()))?;

        assert_eq!(decoded.id.as_deref(), Some("rs666"));
        let ct = &decoded.consequence_types[0];
        assert_eq!(ct.so_terms, vec!["missense_variant"]);
        assert_eq!(
            ct.protein_substitution_scores,
            vec![
                Score::new(0.5, "Other", ""),
                Score::new(0.9, "Polyphen", "probably damaging"),
                Score::new(0.01, "Sift", "deleterious"),
            ]
        );
        assert_eq!(decoded.xrefs.len(), 5);
        assert_eq!(decoded.conserved_region_scores, vec![Score::new(0.3, "phylop", "")]);

        Ok(())
    }

    #[traced_test]
    #[test]
    fn unknown_so_term_is_skipped() {
        let mut annotation = annotation();
        annotation.consequence_types[0]
            .so_terms
            .push(String::from("not_a_term"));

        let document = AnnotationCodec.encode(&annotation);

        assert_eq!(document["ct"][0]["so"], json!([1583]));
        assert!(logs_contain("unknown Sequence Ontology term"));
    }

    #[traced_test]
    #[test]
    fn decode_checks_so_accessions() -> Result<(), anyhow::Error> {
        let document = json!({"ct": [{"gn": "BRCA2", "so": [1583, 99999]}]});
        let decoded = AnnotationCodec.decode(document.as_object().unwrap())?;
        assert_eq!(decoded.consequence_types[0].so_terms, vec!["missense_variant"]);
        assert!(logs_contain("unknown Sequence Ontology accession 99999"));

        // 4294968879 would wrap around to 1583 if narrowed unchecked
        let document = json!({"ct": [{"so": [4_294_968_879_i64]}]});
        assert!(matches!(
            AnnotationCodec.decode(document.as_object().unwrap()),
            Err(Error::OutOfRange { .. })
        ));

        Ok(())
    }

    #[test]
    fn clinical_data_kept_as_map() -> Result<(), anyhow::Error> {
        let mut annotation = VariantAnnotation::default();
        annotation
            .clinical_data
            .insert(String::from("clinvar"), json!([{"acc": "RCV000"}]));
        annotation
            .clinical_data
            .insert(String::from("cosmic"), Value::Null);

        let document = AnnotationCodec.encode(&annotation);
        assert_eq!(
            Value::Object(document.clone()),
            json!({"clinicalData": {"clinvar": [{"acc": "RCV000"}]}})
        );
        assert_eq!(
            AnnotationCodec.decode(&document)?.clinical_data,
            [(String::from("clinvar"), json!([{"acc": "RCV000"}]))]
                .into_iter()
                .collect::<indexmap::IndexMap<_, _>>()
        );

        Ok(())
    }

    #[rstest::rstest]
    #[case("missense_variant", 1583)]
    #[case("intergenic_variant", 1628)]
    #[case("5_prime_UTR_variant", 1623)]
    fn so_table(#[case] term: &str, #[case] accession: i32) {
        assert_eq!(so_term_to_accession(term), Some(accession));
        assert_eq!(so_accession_to_term(accession), Some(term));
    }
}
