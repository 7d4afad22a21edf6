//! Tool inputs and tool specs
//!
//! Every tool takes a typed input struct. The JSON schema sent to the model
//! is generated from that struct, and incoming arguments are validated by
//! deserializing into it.

use crate::core::constants::tool;
use crate::models::openai::{OpenAIFunctionDef, OpenAITool};
use crate::tools::context::ToolContext;
use crate::tools::{memory_tool, rag_tool};
use async_trait::async_trait;
use chrono::SecondsFormat;
use chrono_tz::Tz;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single tool invocation
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not match the input schema
    #[error("validation error: {}", describe_validation(.0))]
    Validation(Vec<Value>),

    /// The tool ran and failed
    #[error("{0}")]
    Runtime(String),
}

/// `msg` of each detail, joined
fn describe_validation(details: &[Value]) -> String {
    details
        .iter()
        .map(|detail| match detail.get("msg").and_then(Value::as_str) {
            Some(msg) => msg.to_string(),
            None => detail.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ToolError {
    pub fn validation(kind: &str, message: impl Into<String>) -> Self {
        ToolError::Validation(vec![json!({"type": kind, "msg": message.into()})])
    }
}

impl From<crate::store::StoreError> for ToolError {
    fn from(e: crate::store::StoreError) -> Self {
        ToolError::Runtime(e.to_string())
    }
}

impl From<crate::core::provider::ProviderError> for ToolError {
    fn from(e: crate::core::provider::ProviderError) -> Self {
        ToolError::Runtime(e.to_string())
    }
}

/// Typed tool arguments
pub trait ToolInput: DeserializeOwned + JsonSchema + Send + 'static {
    /// Checks serde cannot express
    fn validate(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

fn default_five() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchDocumentsInput {
    /// 검색 질문 또는 키워드
    pub query: String,
    /// 반환할 결과 수
    #[serde(default = "default_five")]
    pub n_results: usize,
}

impl ToolInput for SearchDocumentsInput {}

/// Kind of a long-term memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Profile,
    #[default]
    Episodic,
    Knowledge,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Profile => crate::core::constants::memory::PROFILE,
            MemoryType::Episodic => crate::core::constants::memory::EPISODIC,
            MemoryType::Knowledge => crate::core::constants::memory::KNOWLEDGE,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "profile" => Some(MemoryType::Profile),
            "episodic" => Some(MemoryType::Episodic),
            "knowledge" => Some(MemoryType::Knowledge),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory type filter for reads; `all` disables filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryFilter {
    #[default]
    All,
    Profile,
    Episodic,
    Knowledge,
}

impl MemoryFilter {
    pub fn memory_type(&self) -> Option<MemoryType> {
        match self {
            MemoryFilter::All => None,
            MemoryFilter::Profile => Some(MemoryType::Profile),
            MemoryFilter::Episodic => Some(MemoryType::Episodic),
            MemoryFilter::Knowledge => Some(MemoryType::Knowledge),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadMemoryInput {
    /// 검색할 기억 내용
    pub query: String,
    /// 메모리 타입 ('all', 'profile', 'episodic', 'knowledge')
    #[serde(default)]
    pub memory_type: MemoryFilter,
    /// 반환할 결과 수
    #[serde(default = "default_five")]
    pub top_k: usize,
}

impl ToolInput for ReadMemoryInput {}

fn default_importance() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteMemoryInput {
    /// 저장할 내용
    pub content: String,
    /// 메모리 타입 ('profile': 개인정보, 'episodic': 대화/사건, 'knowledge': 학습한 지식)
    #[serde(default)]
    pub memory_type: MemoryType,
    /// 중요도 (1: 낮음, 2: 약간 중요, 3: 보통, 4: 중요, 5: 매우 중요)
    #[serde(default = "default_importance")]
    #[schemars(range(min = 1, max = 5))]
    pub importance: u8,
    /// 태그 리스트
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ToolInput for WriteMemoryInput {
    fn validate(&self) -> Result<(), ToolError> {
        if !(1..=5).contains(&self.importance) {
            return Err(ToolError::validation(
                "less_than_equal",
                format!("importance must be between 1 and 5, got {}", self.importance),
            ));
        }
        Ok(())
    }
}

/// Arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CalculatorInput {
    /// 첫 번째 숫자
    pub a: f64,
    /// 연산자 (+, -, *, /)
    pub op: Operator,
    /// 두 번째 숫자
    pub b: f64,
}

impl ToolInput for CalculatorInput {}

fn default_timezone() -> String {
    "Asia/Seoul".to_string()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTimeInput {
    /// IANA 타임존 이름 (예: 'Asia/Seoul', 'America/New_York', 'Europe/London')
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl ToolInput for GetTimeInput {}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GoogleSearchInput {
    /// 검색 쿼리
    pub query: String,
    /// 반환할 결과 수 (기본 5개)
    #[serde(default = "default_five")]
    pub num_results: usize,
}

impl ToolInput for GoogleSearchInput {}

/// Four-function arithmetic
pub fn calculator(input: &CalculatorInput) -> Result<Value, ToolError> {
    let value = match input.op {
        Operator::Add => input.a + input.b,
        Operator::Sub => input.a - input.b,
        Operator::Mul => input.a * input.b,
        Operator::Div => {
            if input.b == 0.0 {
                return Err(ToolError::Runtime("Division by zero".to_string()));
            }
            input.a / input.b
        }
    };

    Ok(json!({
        "expression": format!("{:?} {} {:?}", input.a, input.op.symbol(), input.b),
        "result": value,
    }))
}

/// Current time in an IANA timezone
pub fn get_time(input: &GetTimeInput) -> Result<Value, ToolError> {
    let zone: Tz = input
        .timezone
        .parse()
        .map_err(|_| ToolError::Runtime(format!("Unknown timezone: {}", input.timezone)))?;
    let now = chrono::Utc::now().with_timezone(&zone);

    Ok(json!({
        "timezone": input.timezone,
        "iso": now.to_rfc3339_opts(SecondsFormat::Micros, false),
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M:%S").to_string(),
        "weekday": now.format("%A").to_string(),
    }))
}

/// Executes a tool with raw JSON arguments
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Deserializes and validates arguments before handing them to `run`
struct TypedHandler<I, F> {
    run: F,
    _input: PhantomData<fn(I)>,
}

#[async_trait]
impl<I, F> ToolHandler for TypedHandler<I, F>
where
    I: ToolInput,
    F: Fn(I) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync,
{
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let input: I = serde_json::from_value(args)
            .map_err(|e| ToolError::validation("value_error", e.to_string()))?;
        input.validate()?;
        (self.run)(input).await
    }
}

/// Tool metadata plus its handler
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl ToolSpec {
    /// Build a spec whose parameters schema is generated from `I`
    pub fn new<I, F>(name: &str, description: &str, run: F) -> Self
    where
        I: ToolInput,
        F: Fn(I) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: input_schema::<I>(),
            handler: Arc::new(TypedHandler {
                run,
                _input: PhantomData,
            }),
        }
    }
}

/// JSON schema of a tool input without the `$schema` marker
pub fn input_schema<I: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(I)).unwrap_or_else(|_| json!({}));
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    schema
}

/// Function-calling form of a spec
pub fn as_openai_tool_spec(spec: &ToolSpec) -> OpenAITool {
    OpenAITool {
        tool_type: tool::FUNCTION.to_string(),
        function: OpenAIFunctionDef {
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            parameters: spec.parameters.clone(),
        },
    }
}

/// The six built-in tools, in registration order
pub fn default_tool_specs(ctx: Arc<ToolContext>) -> Vec<ToolSpec> {
    let search_ctx = ctx.clone();
    let read_ctx = ctx.clone();
    let write_ctx = ctx.clone();
    let web_ctx = ctx;

    vec![
        ToolSpec::new(
            tool::SEARCH_DOCUMENTS,
            "수업 자료 PDF에서 관련 내용을 검색합니다. Function Calling, RAG, LangGraph, ReAct 등 강의 내용에 대한 질문에 사용하세요.",
            move |input: SearchDocumentsInput| {
                let ctx = search_ctx.clone();
                Box::pin(async move {
                    Ok(rag_tool::search_documents(&ctx, &input.query, input.n_results).await)
                })
            },
        ),
        ToolSpec::new(
            tool::READ_MEMORY,
            "과거 대화 내용에서 관련 기억을 검색합니다. 사용자의 이전 발언, 선호사항, 과거 대화 내용을 찾을 때 사용하세요.",
            move |input: ReadMemoryInput| {
                let ctx = read_ctx.clone();
                Box::pin(async move {
                    Ok(memory_tool::read_memory_json(
                        &ctx.memory,
                        &input.query,
                        input.memory_type,
                        input.top_k,
                    )
                    .await)
                })
            },
        ),
        ToolSpec::new(
            tool::WRITE_MEMORY,
            "중요한 정보를 장기 기억에 저장합니다. 사용자의 개인정보, 선호사항, 중요한 대화 내용을 기록할 때 사용하세요.",
            move |input: WriteMemoryInput| {
                let ctx = write_ctx.clone();
                Box::pin(async move {
                    Ok(memory_tool::write_memory_json(
                        &ctx.memory,
                        &input.content,
                        input.memory_type,
                        input.importance,
                        input.tags,
                    )
                    .await)
                })
            },
        ),
        ToolSpec::new(
            tool::CALCULATOR,
            "간단한 사칙연산을 수행합니다. 덧셈, 뺄셈, 곱셈, 나눗셈을 지원합니다.",
            |input: CalculatorInput| Box::pin(async move { calculator(&input) }),
        ),
        ToolSpec::new(
            tool::GET_TIME,
            "특정 타임존의 현재 시간을 조회합니다.",
            |input: GetTimeInput| Box::pin(async move { get_time(&input) }),
        ),
        ToolSpec::new(
            tool::GOOGLE_SEARCH,
            "Google 검색을 통해 최신 정보를 검색합니다. 실시간 뉴스, 최신 기술 동향, 현재 사건 등을 찾을 때 사용하세요.",
            move |input: GoogleSearchInput| {
                let ctx = web_ctx.clone();
                Box::pin(async move { Ok(ctx.web.search(&input.query, input.num_results).await) })
            },
        ),
    ]
}
