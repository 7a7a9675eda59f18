//! Processing orchestrator: the per-job pipeline.
//!
//! For each claimed job: resolve publisher config, acquire content (cache or
//! crawl), evaluate the threshold gate, fan out the LLM work, persist the
//! artifacts, and settle the bookkeeping. Every failure is classified into
//! the job error taxonomy; the worker loop turns the classification into a
//! queue transition.

mod slot;

pub use slot::SlotReservation;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use askpage_common::config::PublisherConfig;
use askpage_common::ids::{BlogId, QuestionId};
use askpage_common::types::{BlogContent, ErrorType, Job, Publisher, Question, Summary};
use askpage_common::url::domain_of;

use crate::crawler::{Crawler, MIN_WORD_COUNT};
use crate::docs::DocStore;
use crate::embeddings::EmbeddingClient;
use crate::llm::{prompts, LlmClient, TextRequest};
use crate::queue::JobQueue;
use crate::store::PublisherStore;

/// Characters of article text sent to the embedding API.
const MAX_EMBED_CHARS: usize = 8_000;

/// A classified pipeline failure, ready for `Fail(job_id, …)`.
#[derive(Debug)]
pub struct PipelineError {
    pub error_type: ErrorType,
    pub message: String,
}

impl PipelineError {
    fn new(error_type: ErrorType, message: impl std::fmt::Display) -> Self {
        Self {
            error_type,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type.as_db_str(), self.message)
    }
}

/// Terminal outcome of a successfully settled job.
#[derive(Debug)]
pub enum JobOutcome {
    Completed { questions: usize },
    Skipped,
}

enum GateResult {
    Proceed { content: BlogContent },
    ThresholdNotMet,
}

/// Drives the end-to-end pipeline for claimed jobs.
pub struct Orchestrator {
    store: PublisherStore,
    docs: DocStore,
    queue: JobQueue,
    llm: Arc<LlmClient>,
    embeddings: Arc<EmbeddingClient>,
    crawler: Crawler,
}

impl Orchestrator {
    pub fn new(
        store: PublisherStore,
        docs: DocStore,
        queue: JobQueue,
        llm: Arc<LlmClient>,
        embeddings: Arc<EmbeddingClient>,
        crawler: Crawler,
    ) -> Self {
        Self {
            store,
            docs,
            queue,
            llm,
            embeddings,
            crawler,
        }
    }

    /// Process one claimed job to a settled state.
    ///
    /// On `Ok`, the job has been transitioned (`completed` or `skipped`) and
    /// the slot settled. On `Err`, the job is still `processing` and the
    /// slot still held — the worker records the failure, and the slot is
    /// released only if the failure dead-letters the job.
    pub async fn process_job(&self, job: &Job) -> Result<JobOutcome, PipelineError> {
        let (publisher, config) = self.resolve_config(job).await?;
        let slot = publisher
            .as_ref()
            .map(|p| SlotReservation::new(self.store.clone(), p.id));

        match self.run_gated_pipeline(job, &config).await {
            Ok(GateResult::Proceed { content }) => {
                match self.generate_and_persist(&config, &content).await {
                    Ok(question_count) => {
                        self.settle_completed(job, publisher.as_ref(), slot, &content, question_count)
                            .await?;
                        Ok(JobOutcome::Completed {
                            questions: question_count,
                        })
                    }
                    Err(e) => {
                        if let Some(slot) = slot {
                            slot.keep();
                        }
                        Err(e)
                    }
                }
            }
            Ok(GateResult::ThresholdNotMet) => {
                self.queue
                    .skip(job.job_id, "threshold_not_met")
                    .await
                    .map_err(|e| PipelineError::new(ErrorType::Db, e))?;
                if let Some(slot) = slot {
                    if let Err(e) = slot.release_unprocessed().await {
                        tracing::error!(job_id = %job.job_id, error = %e, "Failed to release slot after skip");
                    }
                }
                metrics::counter!("pipeline.jobs.skipped").increment(1);
                Ok(JobOutcome::Skipped)
            }
            Err(e) => {
                if let Some(slot) = slot {
                    slot.keep();
                }
                Err(e)
            }
        }
    }

    /// Step 1: resolve the publisher and the effective config. A missing
    /// publisher is not an error — the job's config snapshot (or hardcoded
    /// defaults) applies and no slot bookkeeping happens.
    async fn resolve_config(
        &self,
        job: &Job,
    ) -> Result<(Option<Publisher>, PublisherConfig), PipelineError> {
        let domain = domain_of(&job.blog_url)
            .map_err(|e| PipelineError::new(ErrorType::Validation, e))?;

        let publisher = self
            .store
            .get_by_domain(&domain, false)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        let config = match &publisher {
            Some(p) => p.config.clone(),
            None => {
                tracing::info!(
                    job_id = %job.job_id,
                    domain = %domain,
                    "No publisher registered for domain, using config snapshot / defaults"
                );
                serde_json::from_value(job.config.clone()).unwrap_or_default()
            }
        };

        Ok((publisher, config))
    }

    /// Steps 2–3: acquire content and evaluate the threshold gate on the
    /// post-increment trigger count.
    async fn run_gated_pipeline(
        &self,
        job: &Job,
        config: &PublisherConfig,
    ) -> Result<GateResult, PipelineError> {
        let content = self.acquire_content(job).await?;

        let triggered = self
            .docs
            .increment_triggered(&content.url)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        if triggered <= config.threshold_before_processing_blog as i32 {
            tracing::info!(
                job_id = %job.job_id,
                triggered,
                threshold = config.threshold_before_processing_blog,
                "Threshold not met, skipping"
            );
            return Ok(GateResult::ThresholdNotMet);
        }

        Ok(GateResult::Proceed { content })
    }

    /// Step 2: cached content wins when it is usable; otherwise crawl and
    /// persist with a zero trigger count.
    async fn acquire_content(&self, job: &Job) -> Result<BlogContent, PipelineError> {
        let cached = self
            .docs
            .get_content_by_url(&job.blog_url)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        if let Some(content) = cached {
            if !content.extracted_text.is_empty() && content.word_count >= MIN_WORD_COUNT {
                metrics::counter!("pipeline.content.cache_hit").increment(1);
                return Ok(content);
            }
        }

        let page = self
            .crawler
            .fetch_blog(&job.blog_url)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Crawl, e))?;

        let content = BlogContent {
            id: BlogId::new(),
            url: job.blog_url.clone(),
            title: page.title,
            author: page.author,
            published_date: page.published_date,
            word_count: page.word_count,
            extracted_text: page.text,
            triggered_count: 0,
            created_at: Utc::now(),
        };

        metrics::counter!("pipeline.content.crawled").increment(1);

        self.docs
            .insert_content(&content)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))
    }

    /// Steps 4–5: LLM fan-out and persistence. Summary generation, question
    /// generation, and the article embedding run concurrently; question
    /// embeddings follow in one batch once the questions exist.
    async fn generate_and_persist(
        &self,
        config: &PublisherConfig,
        content: &BlogContent,
    ) -> Result<usize, PipelineError> {
        let question_count = config.questions_per_blog_clamped();

        let (summary_system, summary_user) = prompts::summary_prompt(
            config.custom_summary_prompt.as_deref(),
            content.title.as_deref(),
            &content.extracted_text,
        );
        let summary_req = TextRequest {
            model: &config.summary_model,
            system: &summary_system,
            user: &summary_user,
            max_tokens: config.summary_max_tokens,
            temperature: PublisherConfig::clamp_temperature(config.summary_temperature),
            grounding: config.use_grounding,
        };

        let (questions_system, questions_user) = prompts::questions_prompt(
            config.custom_question_prompt.as_deref(),
            content.title.as_deref(),
            &content.extracted_text,
            question_count,
        );
        let questions_req = TextRequest {
            model: &config.questions_model,
            system: &questions_system,
            user: &questions_user,
            max_tokens: config.questions_max_tokens,
            temperature: PublisherConfig::clamp_temperature(config.questions_temperature),
            grounding: config.use_grounding,
        };

        let embed_text = truncate_chars(&content.extracted_text, MAX_EMBED_CHARS);

        let (summary_json, questions_json, article_embedding) = tokio::join!(
            self.llm.generate_json(&summary_req),
            self.llm.generate_json(&questions_req),
            self.embeddings.embed_single(embed_text),
        );

        let summary_json = summary_json.map_err(|e| PipelineError::new(ErrorType::Llm, e))?;
        let questions_json = questions_json.map_err(|e| PipelineError::new(ErrorType::Llm, e))?;
        let article_embedding =
            article_embedding.map_err(|e| PipelineError::new(ErrorType::Llm, e))?;

        let summary = prompts::parse_summary(&summary_json)
            .map_err(|e| PipelineError::new(ErrorType::Llm, e))?;
        let generated = prompts::parse_questions(&questions_json, question_count)
            .map_err(|e| PipelineError::new(ErrorType::Llm, e))?;

        let question_texts: Vec<String> = generated.iter().map(|q| q.question.clone()).collect();
        let question_embeddings = self
            .embeddings
            .embed_batch(&question_texts)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Llm, e))?;

        let domain = domain_of(&content.url)
            .map_err(|e| PipelineError::new(ErrorType::Validation, e))?;

        self.docs
            .upsert_summary(&Summary {
                blog_url: content.url.clone(),
                domain,
                summary: summary.summary,
                key_points: summary.key_points,
                embedding: Some(article_embedding),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        let now = Utc::now();
        let questions: Vec<Question> = generated
            .into_iter()
            .enumerate()
            .map(|(i, q)| Question {
                id: QuestionId::new(),
                blog_url: content.url.clone(),
                blog_id: content.id,
                question: q.question,
                answer: q.answer,
                icon: q.icon,
                embedding: question_embeddings.get(i).cloned(),
                click_count: 0,
                created_at: now,
            })
            .collect();

        let count = questions.len();
        self.docs
            .replace_questions(&questions)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        metrics::counter!("pipeline.questions.generated").increment(count as u64);

        Ok(count)
    }

    /// Step 6: bookkeeping. Slot converts to a processed blog, counters
    /// advance, and the job completes.
    async fn settle_completed(
        &self,
        job: &Job,
        publisher: Option<&Publisher>,
        slot: Option<SlotReservation>,
        content: &BlogContent,
        question_count: usize,
    ) -> Result<(), PipelineError> {
        if let Some(slot) = slot {
            slot.commit()
                .await
                .map_err(|e| PipelineError::new(ErrorType::Db, e))?;
        }

        if let Some(p) = publisher {
            self.store
                .increment_questions_generated(p.id, question_count as i64)
                .await
                .map_err(|e| PipelineError::new(ErrorType::Db, e))?;
        }

        let result = json!({
            "blog_id": content.id,
            "questions_generated": question_count,
            "word_count": content.word_count,
        });

        self.queue
            .complete(job.job_id, &result)
            .await
            .map_err(|e| PipelineError::new(ErrorType::Db, e))?;

        metrics::counter!("pipeline.jobs.completed").increment(1);
        Ok(())
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
