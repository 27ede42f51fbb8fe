use crate::{
    error::FactoryError,
    retry::classify_source_error,
    step::ObjectStep,
    transform::{TransformPipeline, field_mask::FieldMaskTransform, masking::MaskRegistry},
};
use connectors::source::QuerySpec;
use engine_core::context::JobContext;
use model::{
    describe::ObjectDescribe,
    manifest::Libraries,
    rules::{ObjectRule, RuleKind},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Turns the rules of a job manifest into runnable steps.
pub struct StepsFactory {
    registry: Arc<MaskRegistry>,
}

impl Default for StepsFactory {
    fn default() -> Self {
        Self::new(MaskRegistry::with_defaults())
    }
}

impl StepsFactory {
    pub fn new(registry: MaskRegistry) -> Self {
        StepsFactory {
            registry: Arc::new(registry),
        }
    }

    /// Validates every rule, fetches all schema descriptions in one call and
    /// builds one step per object in rule order. Nothing is processed when
    /// any rule is invalid. A masking object without a description gets a
    /// step that fails on its own; deletes need no schema.
    pub async fn build(
        &self,
        rules: &BTreeMap<String, ObjectRule>,
        libraries: Libraries,
        ctx: &JobContext,
    ) -> Result<Vec<ObjectStep>, FactoryError> {
        let kinds = self.validate(rules, &libraries)?;
        let describes = self.describe(rules, ctx).await?;
        let libraries = Arc::new(libraries);

        let mut steps = Vec::with_capacity(rules.len());
        for (object, rule) in rules {
            let kind = kinds[object.as_str()];
            let step = match (kind, describes.get(object).cloned()) {
                (RuleKind::Masking, None) => {
                    warn!(object = %object, "No schema description, object will fail");
                    let spec = QuerySpec::new(object, &[]).with_filter(rule.filter());
                    ObjectStep::new(kind, spec, None, ctx.clone()).undescribed()
                }
                (RuleKind::Masking, Some(describe)) => {
                    // Fields without a description stay out of the query; the
                    // transform reports them on the first record.
                    let fields: Vec<String> = rule
                        .field_rules
                        .keys()
                        .filter_map(|f| describe.field(f).map(|d| d.name.clone()))
                        .collect();
                    let spec = QuerySpec::new(object, &fields).with_filter(rule.filter());
                    let pipeline = TransformPipeline::new().add_transform(FieldMaskTransform::new(
                        object,
                        rule.field_rules.clone(),
                        describe,
                        self.registry.clone(),
                        libraries.clone(),
                    ));
                    ObjectStep::new(kind, spec, Some(pipeline), ctx.clone())
                }
                (RuleKind::Delete, _) => {
                    let spec = QuerySpec::new(object, &[]).with_filter(rule.filter());
                    ObjectStep::new(kind, spec, None, ctx.clone())
                }
            };
            debug!(object = %object, kind = %kind, soql = %step.spec().to_soql(), "Built step");
            steps.push(step);
        }

        info!(steps = steps.len(), "Steps ready");
        Ok(steps)
    }

    fn validate<'a>(
        &self,
        rules: &'a BTreeMap<String, ObjectRule>,
        libraries: &Libraries,
    ) -> Result<HashMap<&'a str, RuleKind>, FactoryError> {
        let mut kinds = HashMap::with_capacity(rules.len());
        for (object, rule) in rules {
            let kind = rule.kind().map_err(|e| FactoryError::UnknownRuleType {
                object: object.clone(),
                rule_type: e.0,
            })?;

            if kind == RuleKind::Masking {
                for (field, field_rule) in &rule.field_rules {
                    if !self.registry.contains(&field_rule.mask_type) {
                        return Err(FactoryError::UnknownMaskType {
                            object: object.clone(),
                            field: field.clone(),
                            mask_type: field_rule.mask_type.clone(),
                        });
                    }
                }
                if let Some(library) = rule
                    .referenced_libraries()
                    .into_iter()
                    .find(|l| !libraries.contains_key(*l))
                {
                    return Err(FactoryError::UnknownLibrary {
                        object: object.clone(),
                        library: library.to_string(),
                    });
                }
            }
            kinds.insert(object.as_str(), kind);
        }
        Ok(kinds)
    }

    async fn describe(
        &self,
        rules: &BTreeMap<String, ObjectRule>,
        ctx: &JobContext,
    ) -> Result<HashMap<String, Arc<ObjectDescribe>>, FactoryError> {
        let objects: Vec<String> = rules.keys().cloned().collect();
        let source = &ctx.source;
        let described = ctx
            .retry
            .run("describe", || source.describe(&objects), classify_source_error)
            .await
            .map_err(|e| FactoryError::Describe(e.into_inner()))?;

        Ok(described
            .into_iter()
            .map(|(name, describe)| (name, Arc::new(describe)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StepError,
        test_utils::{accounts, job_context, test_settings},
    };
    use connectors::memory::MemorySource;
    use model::{manifest::Library, rules::FieldRule};
    use serde_json::json;

    fn rule(rule_type: &str, fields: &[(&str, FieldRule)]) -> ObjectRule {
        ObjectRule {
            rule_type: rule_type.to_string(),
            where_clause: None,
            disable_triggers: false,
            disable_flows: false,
            disable_validation_rules: false,
            field_rules: fields
                .iter()
                .map(|(f, r)| (f.to_string(), r.clone()))
                .collect(),
        }
    }

    async fn build(
        source: MemorySource,
        rules: BTreeMap<String, ObjectRule>,
        libraries: Libraries,
    ) -> (Arc<MemorySource>, Result<Vec<ObjectStep>, FactoryError>) {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(source);
        let objects: Vec<&str> = rules.keys().map(String::as_str).collect();
        let ctx = job_context(dir.path(), source.clone(), test_settings(dir.path()), &objects).await;
        let result = StepsFactory::default().build(&rules, libraries, &ctx).await;
        (source, result)
    }

    #[tokio::test]
    async fn builds_one_step_per_object_with_a_single_describe() {
        let mut masking = rule(
            "MASKING",
            &[
                ("phone", FieldRule::new("RANDOM_PHONE")),
                ("Nickname__c", FieldRule::new("BLANK")),
            ],
        );
        masking.where_clause = Some("  Rating = 'Hot' ".into());
        let rules = BTreeMap::from([
            ("Account".to_string(), masking),
            ("Contact".to_string(), rule("DELETE", &[])),
        ]);
        let source = accounts(MemorySource::new(), 1).with_object(
            ObjectDescribe::new("Contact", vec![]),
            vec![],
        );

        let (source, steps) = build(source, rules, Libraries::new()).await;
        let steps = steps.unwrap();

        assert_eq!(source.stats().describe, 1);
        assert_eq!(steps.len(), 2);

        let account = &steps[0];
        assert_eq!(account.kind(), RuleKind::Masking);
        assert!(account.masks_records());
        assert_eq!(account.spec().fields, vec!["Id", "Phone"]);
        assert_eq!(account.spec().filter.as_deref(), Some("Rating = 'Hot'"));

        let contact = &steps[1];
        assert_eq!(contact.kind(), RuleKind::Delete);
        assert!(!contact.masks_records());
        assert_eq!(contact.spec().fields, vec!["Id"]);
    }

    #[tokio::test]
    async fn unknown_rule_type_fails_before_describing() {
        let rules = BTreeMap::from([
            ("Account".to_string(), rule("DELETE", &[])),
            ("Contact".to_string(), rule("ARCHIVE", &[])),
        ]);
        let (source, result) = build(accounts(MemorySource::new(), 1), rules, Libraries::new()).await;

        assert!(matches!(
            result,
            Err(FactoryError::UnknownRuleType { ref object, ref rule_type })
                if object == "Contact" && rule_type == "ARCHIVE"
        ));
        assert_eq!(source.stats().describe, 0);
    }

    #[tokio::test]
    async fn rejects_unknown_mask_types_and_libraries() {
        let rules = BTreeMap::from([(
            "Account".to_string(),
            rule("MASKING", &[("Name", FieldRule::new("SCRAMBLE"))]),
        )]);
        let (_, result) = build(accounts(MemorySource::new(), 1), rules, Libraries::new()).await;
        assert!(matches!(result, Err(FactoryError::UnknownMaskType { ref mask_type, .. }) if mask_type == "SCRAMBLE"));

        let rules = BTreeMap::from([(
            "Account".to_string(),
            rule("MASKING", &[("Name", FieldRule::new("LIBRARY").with_value(json!("surnames")))]),
        )]);
        let libraries = Libraries::from([(
            "names".to_string(),
            Library::Strings(vec!["Smith".into()]),
        )]);
        let (_, result) = build(accounts(MemorySource::new(), 1), rules, libraries).await;
        assert!(matches!(result, Err(FactoryError::UnknownLibrary { ref library, .. }) if library == "surnames"));
    }

    #[tokio::test]
    async fn undescribed_object_fails_only_its_own_step() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(accounts(MemorySource::new(), 2));
        let rules = BTreeMap::from([
            ("Account".to_string(), rule("DELETE", &[])),
            ("Lead".to_string(), rule("MASKING", &[("Company", FieldRule::new("BLANK"))])),
            ("Opportunity".to_string(), rule("DELETE", &[])),
        ]);
        let objects: Vec<&str> = rules.keys().map(String::as_str).collect();
        let ctx = job_context(dir.path(), source.clone(), test_settings(dir.path()), &objects).await;

        let steps = StepsFactory::default()
            .build(&rules, Libraries::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(steps.len(), 3);

        assert!(steps[0].run().await.is_ok());
        assert!(matches!(steps[1].run().await, Err(StepError::NotDescribed(ref o)) if o == "Lead"));
        assert!(steps[2].run().await.is_ok());
        assert_eq!(source.stats().count, 2);
        assert!(source.records("Account").is_empty());
    }
}
