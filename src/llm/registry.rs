//! # Model registry and selection
//!
//! [`ModelRegistry`] is the static table of models the application knows
//! about. [`ModelSelector`] answers "which model should I use" questions over
//! that table: by capability, task, provider, price, or a weighted score.
//!
//! Declaration order matters: every selection that has to break a tie keeps
//! the model that appears first.
//!
//! ## Score
//! ```text
//! score = context_window / 1000
//!       + 10 * |capabilities|
//!       + 20 (function calling) + 15 (vision) + 5 (streaming)
//!       - 100 * (input + output cost per 1K tokens)
//! ```

use once_cell::sync::Lazy;
use std::cmp::Ordering;

use super::{LlmModel, LlmProvider, LlmTask, ModelCapability, ModelCost};
use ModelCapability::{Chat, Completion, Embedding, Vision};

pub const GPT_4O: &str = "gpt-4o";
pub const GPT_4: &str = "gpt-4";
pub const GPT_4_TURBO: &str = "gpt-4-turbo";
pub const GPT_35_TURBO: &str = "gpt-3.5-turbo";
/// 1536 dimensions.
pub const TEXT_EMBEDDING_3_SMALL: &str = "text-embedding-3-small";
/// 3072 dimensions.
pub const TEXT_EMBEDDING_3_LARGE: &str = "text-embedding-3-large";

#[allow(clippy::too_many_arguments)]
fn model(
    id: &str,
    name: &str,
    capabilities: &[ModelCapability],
    tasks: &[LlmTask],
    cost: (f64, f64),
    context_window: u32,
    max_output_tokens: Option<u32>,
    flags: (bool, bool, bool),
) -> LlmModel {
    let (supports_streaming, supports_vision, supports_function_calling) = flags;
    LlmModel {
        id: id.to_string(),
        name: name.to_string(),
        provider: LlmProvider::OpenAi,
        capabilities: capabilities.to_vec(),
        tasks: tasks.to_vec(),
        cost: Some(ModelCost {
            input_token: cost.0,
            output_token: cost.1,
        }),
        context_window: Some(context_window),
        max_output_tokens,
        supports_streaming,
        supports_vision,
        supports_function_calling,
    }
}

static MODELS: Lazy<Vec<LlmModel>> = Lazy::new(|| {
    use LlmTask::*;
    vec![
        model(
            GPT_4O,
            "GPT 4o",
            &[Completion, Chat, Vision],
            &[FunctionCall, ToolUse, CodeGen, Rag, MetadataSearch],
            (0.005, 0.015),
            128_000,
            Some(4096),
            (true, true, true),
        ),
        model(
            GPT_4,
            "GPT-4",
            &[Completion, Chat, Vision],
            &[FunctionCall, ToolUse, CodeGen, Rag],
            (0.03, 0.06),
            8192,
            Some(4096),
            (true, true, true),
        ),
        model(
            GPT_4_TURBO,
            "GPT 4 Turbo",
            &[Completion, Chat, Vision],
            &[FunctionCall, ToolUse, CodeGen, Rag],
            (0.01, 0.03),
            128_000,
            Some(4096),
            (true, true, true),
        ),
        model(
            GPT_35_TURBO,
            "GPT 3.5 Turbo",
            &[Completion],
            &[CodeGen, Rag, MetadataSearch],
            (0.0015, 0.002),
            16_385,
            Some(4096),
            (true, false, true),
        ),
        model(
            TEXT_EMBEDDING_3_SMALL,
            "OpenAI Text Embedding Small",
            &[Embedding],
            &[Rag, MetadataSearch],
            (0.00002, 0.0),
            8191,
            None,
            (false, false, false),
        ),
        model(
            TEXT_EMBEDDING_3_LARGE,
            "OpenAI Text Embedding Large",
            &[Embedding],
            &[Rag, MetadataSearch],
            (0.00013, 0.0),
            8191,
            None,
            (false, false, false),
        ),
    ]
});

/// The static model table.
pub struct ModelRegistry;

impl ModelRegistry {
    pub fn all() -> &'static [LlmModel] {
        &MODELS
    }

    pub fn find(id: &str) -> Option<&'static LlmModel> {
        MODELS.iter().find(|m| m.id == id)
    }

    pub fn gpt_4o() -> &'static LlmModel {
        &MODELS[0]
    }

    pub fn gpt_4() -> &'static LlmModel {
        &MODELS[1]
    }

    pub fn embedding_small() -> &'static LlmModel {
        &MODELS[4]
    }

    pub fn embedding_large() -> &'static LlmModel {
        &MODELS[5]
    }
}

/// Requirements for [`ModelSelector::best_model_for_use_case`].
#[derive(Debug, Clone)]
pub struct UseCase {
    pub capability: ModelCapability,
    pub task: Option<LlmTask>,
    pub requires_vision: bool,
    pub requires_function_calling: bool,
    /// Upper bound for input + output cost per 1K tokens.
    pub max_budget: Option<f64>,
    /// Narrows the candidates only if at least one model matches.
    pub preferred_provider: Option<LlmProvider>,
}

impl UseCase {
    pub fn new(capability: ModelCapability) -> Self {
        Self {
            capability,
            task: None,
            requires_vision: false,
            requires_function_calling: false,
            max_budget: None,
            preferred_provider: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    Chat,
    Completion,
    Embedding,
    Vision,
    FunctionCalling,
}

/// Selection queries over a model table.
///
/// The associated functions work on [`ModelRegistry::all`]; the `*_in`
/// variants take any slice so callers can select among their own models.
pub struct ModelSelector;

impl ModelSelector {
    pub fn by_capability(capability: ModelCapability) -> Vec<&'static LlmModel> {
        Self::by_capability_in(ModelRegistry::all(), capability)
    }

    pub fn by_capability_in(models: &[LlmModel], capability: ModelCapability) -> Vec<&LlmModel> {
        models
            .iter()
            .filter(|m| m.has_capability(capability))
            .collect()
    }

    pub fn by_provider(provider: LlmProvider) -> Vec<&'static LlmModel> {
        ModelRegistry::all()
            .iter()
            .filter(|m| m.provider == provider)
            .collect()
    }

    pub fn by_task(task: LlmTask) -> Vec<&'static LlmModel> {
        ModelRegistry::all()
            .iter()
            .filter(|m| m.has_task(task))
            .collect()
    }

    /// Models that have every capability in `capabilities`.
    pub fn by_capabilities(capabilities: &[ModelCapability]) -> Vec<&'static LlmModel> {
        ModelRegistry::all()
            .iter()
            .filter(|m| capabilities.iter().all(|c| m.has_capability(*c)))
            .collect()
    }

    pub fn cheapest_by_capability_and_task(
        capability: ModelCapability,
        task: Option<LlmTask>,
    ) -> Option<&'static LlmModel> {
        Self::cheapest_in(ModelRegistry::all(), capability, task)
    }

    pub fn cheapest_in(
        models: &[LlmModel],
        capability: ModelCapability,
        task: Option<LlmTask>,
    ) -> Option<&LlmModel> {
        Self::by_capability_in(models, capability)
            .into_iter()
            .filter(|m| task.is_none_or(|t| m.has_task(t)))
            .reduce(|cheapest, current| {
                if current.total_cost() < cheapest.total_cost() {
                    current
                } else {
                    cheapest
                }
            })
    }

    pub fn best_model_for_use_case(use_case: &UseCase) -> Option<&'static LlmModel> {
        Self::best_in(ModelRegistry::all(), use_case)
    }

    pub fn best_in<'a>(models: &'a [LlmModel], use_case: &UseCase) -> Option<&'a LlmModel> {
        let mut candidates: Vec<&LlmModel> = Self::by_capability_in(models, use_case.capability)
            .into_iter()
            .filter(|m| use_case.task.is_none_or(|t| m.has_task(t)))
            .filter(|m| !use_case.requires_vision || m.supports_vision)
            .filter(|m| !use_case.requires_function_calling || m.supports_function_calling)
            .filter(|m| use_case.max_budget.is_none_or(|b| m.total_cost() <= b))
            .collect();

        if let Some(provider) = use_case.preferred_provider {
            let preferred: Vec<&LlmModel> = candidates
                .iter()
                .copied()
                .filter(|m| m.provider == provider)
                .collect();
            if !preferred.is_empty() {
                candidates = preferred;
            }
        }

        candidates.into_iter().reduce(|best, current| {
            if Self::score(current) > Self::score(best) {
                current
            } else {
                best
            }
        })
    }

    /// Weighted "how capable is this model" score. See the module docs.
    pub fn score(model: &LlmModel) -> f64 {
        let mut score = model.context_window.unwrap_or(0) as f64 / 1000.0;
        score += model.capabilities.len() as f64 * 10.0;
        if model.supports_function_calling {
            score += 20.0;
        }
        if model.supports_vision {
            score += 15.0;
        }
        if model.supports_streaming {
            score += 5.0;
        }
        score - model.total_cost() * 100.0
    }

    pub fn models_for_scenario(scenario: Scenario) -> Vec<&'static LlmModel> {
        let all = ModelRegistry::all();
        let mut models: Vec<&LlmModel> = match scenario {
            Scenario::Chat => Self::by_capability_in(all, Chat),
            Scenario::Completion => Self::by_capability_in(all, Completion),
            Scenario::Embedding => {
                let mut models = Self::by_capability_in(all, Embedding);
                models.sort_by(|a, b| {
                    input_cost(a)
                        .partial_cmp(&input_cost(b))
                        .unwrap_or(Ordering::Equal)
                });
                return models;
            }
            Scenario::Vision => Self::by_capability_in(all, Vision)
                .into_iter()
                .filter(|m| m.supports_vision)
                .collect(),
            Scenario::FunctionCalling => all
                .iter()
                .filter(|m| m.supports_function_calling)
                .collect(),
        };
        // stable sort, so equal scores keep registry order
        models.sort_by(|a, b| {
            Self::score(b)
                .partial_cmp(&Self::score(a))
                .unwrap_or(Ordering::Equal)
        });
        models
    }
}

fn input_cost(model: &LlmModel) -> f64 {
    model.cost.map(|c| c.input_token).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(models: &[&LlmModel]) -> Vec<String> {
        models.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn registry_has_six_models() {
        assert_eq!(ModelRegistry::all().len(), 6);
        assert_eq!(ModelRegistry::gpt_4o().id, GPT_4O);
        assert_eq!(ModelRegistry::embedding_large().id, TEXT_EMBEDDING_3_LARGE);
        assert!(ModelRegistry::find("gpt-3.5-turbo-1106").is_none());
    }

    #[test]
    fn filters_by_capability_and_task() {
        assert_eq!(
            ids(&ModelSelector::by_capability(Chat)),
            vec![GPT_4O, GPT_4, GPT_4_TURBO]
        );
        assert_eq!(
            ids(&ModelSelector::by_task(LlmTask::MetadataSearch)),
            vec![
                GPT_4O,
                GPT_35_TURBO,
                TEXT_EMBEDDING_3_SMALL,
                TEXT_EMBEDDING_3_LARGE
            ]
        );
        assert_eq!(
            ids(&ModelSelector::by_capabilities(&[Chat, Vision])),
            vec![GPT_4O, GPT_4, GPT_4_TURBO]
        );
        assert!(ModelSelector::by_provider(LlmProvider::Anthropic).is_empty());
        assert_eq!(ModelSelector::by_provider(LlmProvider::OpenAi).len(), 6);
    }

    #[test]
    fn cheapest_respects_task() {
        let cheapest = ModelSelector::cheapest_by_capability_and_task(Completion, None).unwrap();
        assert_eq!(cheapest.id, GPT_35_TURBO);

        let cheapest =
            ModelSelector::cheapest_by_capability_and_task(Completion, Some(LlmTask::ToolUse))
                .unwrap();
        assert_eq!(cheapest.id, GPT_4O);

        assert!(
            ModelSelector::cheapest_by_capability_and_task(Embedding, Some(LlmTask::CodeGen))
                .is_none()
        );
    }

    #[test]
    fn score_matches_formula() {
        // 128 + 30 + 20 + 15 + 5 - 2
        let score = ModelSelector::score(ModelRegistry::gpt_4o());
        assert!((score - 196.0).abs() < 1e-9);
        // 8.192 + 30 + 40 - 9
        let score = ModelSelector::score(ModelRegistry::gpt_4());
        assert!((score - 69.192).abs() < 1e-9);
    }

    #[test]
    fn best_model_applies_every_filter() {
        let best = ModelSelector::best_model_for_use_case(&UseCase::new(Chat)).unwrap();
        assert_eq!(best.id, GPT_4O);

        let mut use_case = UseCase::new(Completion);
        use_case.max_budget = Some(0.01);
        assert_eq!(
            ModelSelector::best_model_for_use_case(&use_case).unwrap().id,
            GPT_35_TURBO
        );

        use_case.requires_vision = true;
        assert!(ModelSelector::best_model_for_use_case(&use_case).is_none());

        let mut use_case = UseCase::new(Embedding);
        use_case.task = Some(LlmTask::Rag);
        // same score apart from cost, so the cheaper small model wins
        assert_eq!(
            ModelSelector::best_model_for_use_case(&use_case).unwrap().id,
            TEXT_EMBEDDING_3_SMALL
        );
    }

    #[test]
    fn preferred_provider_only_narrows_when_present() {
        let mut use_case = UseCase::new(Chat);
        use_case.preferred_provider = Some(LlmProvider::Mistral);
        assert_eq!(
            ModelSelector::best_model_for_use_case(&use_case).unwrap().id,
            GPT_4O
        );

        let mut models = ModelRegistry::all().to_vec();
        let mut local = models[3].clone();
        local.id = "llama3".into();
        local.provider = LlmProvider::Ollama;
        local.capabilities = vec![Chat];
        models.push(local);

        use_case.preferred_provider = Some(LlmProvider::Ollama);
        assert_eq!(ModelSelector::best_in(&models, &use_case).unwrap().id, "llama3");
    }

    #[test]
    fn scenarios_are_ordered() {
        assert_eq!(
            ids(&ModelSelector::models_for_scenario(Scenario::Chat)),
            vec![GPT_4O, GPT_4_TURBO, GPT_4]
        );
        assert_eq!(
            ids(&ModelSelector::models_for_scenario(Scenario::Embedding)),
            vec![TEXT_EMBEDDING_3_SMALL, TEXT_EMBEDDING_3_LARGE]
        );
        assert_eq!(
            ids(&ModelSelector::models_for_scenario(Scenario::FunctionCalling)),
            vec![GPT_4O, GPT_4_TURBO, GPT_4, GPT_35_TURBO]
        );
    }
}
