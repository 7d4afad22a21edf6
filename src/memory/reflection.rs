//! Memory extractor
//!
//! After a chat turn the recent conversation is sent to the model with an
//! extraction prompt. Facts rated important enough are written to the
//! memory collection.

use crate::core::client::ModelClient;
use crate::core::constants::role;
use crate::models::openai::OpenAIMessage;
use crate::tools::definitions::MemoryType;
use crate::tools::memory_tool::MemoryTool;
use serde_json::Value;
use tracing::{debug, info, warn};

const EXTRACTOR_TEMPERATURE: f32 = 0.3;

pub const MEMORY_EXTRACTOR_PROMPT: &str = "\
당신은 대화에서 중요한 정보를 추출하여 장기 기억에 저장하는 AI입니다.

다음 대화 내용을 분석하여 저장할 가치가 있는 정보를 찾아주세요.

**저장해야 할 정보 유형:**

1. **Profile (개인정보)** - memory_type: \"profile\"
   - 사용자의 이름, 나이, 직업, 전공
   - 거주지, 가족 관계
   - 연락처, 이메일 등
   예시: \"사용자 이름은 김철수, 컴퓨터공학과 3학년\"

2. **Episodic (대화/사건)** - memory_type: \"episodic\"
   - 중요한 대화 내용, 결정사항
   - 특정 날짜의 사건이나 경험
   - 사용자의 의견, 감정 표현
   예시: \"사용자가 LangGraph를 처음 학습함 (2024-11-27)\"

3. **Knowledge (학습/지식)** - memory_type: \"knowledge\"
   - 사용자가 배운 개념이나 이해한 내용
   - 학습 진도, 완료한 과제
   - 관심 있는 주제나 기술
   예시: \"ReAct 패턴: Thought-Action-Observation 순서로 작동하는 AI Agent 방법론\"

**중요도 판단 기준:**
- 5: 매우 중요한 정보 (이름, 전공, 중요한 결정사항, 장기 목표)
- 4: 중요한 정보 (학습 내용, 선호사항, 프로젝트 정보)
- 3: 보통 정보 (일반적인 대화 내용)
- 2: 약간 중요한 정보 (참고용 정보)
- 1: 낮은 중요도 (단순한 대화)

**출력 형식:**
JSON 배열로 반환하세요. 저장할 정보가 없으면 빈 배열 []을 반환하세요.

[
  {
    \"content\": \"저장할 내용\",
    \"memory_type\": \"profile | episodic | knowledge\",
    \"importance\": 1~5 (정수)
  },
  ...
]

**중요:**
- 저장할 만한 정보가 없으면 빈 배열 []을 반환하세요.
- 단순한 인사말이나 질문만 있는 경우 저장하지 마세요.
- 이미 알고 있는 일반 상식은 저장하지 마세요.
";

/// A fact the extractor proposed for saving
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: u8,
}

/// `User:` / `Assistant:` transcript; tool and system messages are left out
pub fn format_conversation(messages: &[OpenAIMessage]) -> String {
    let mut text = String::new();
    for message in messages {
        match message.role.as_str() {
            role::USER => text.push_str(&format!("User: {}\n\n", message.text())),
            role::ASSISTANT if !message.text().is_empty() => {
                text.push_str(&format!("Assistant: {}\n\n", message.text()))
            }
            _ => {}
        }
    }
    text
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn importance_of(item: &Value) -> u8 {
    item.get("importance")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .map(|v| v.clamp(1, 5) as u8)
        .unwrap_or(1)
}

/// Parse the extractor reply and keep items rated at least `min_importance`
pub fn parse_extraction(reply: &str, min_importance: u8) -> Vec<ExtractedMemory> {
    let cleaned = strip_fences(reply);
    let items: Vec<Value> = match serde_json::from_str(&cleaned) {
        Ok(items) => items,
        Err(e) => {
            let head: String = cleaned.chars().take(200).collect();
            warn!("⚠️ Memory extraction reply is not a JSON array: {} ({})", e, head);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter(|item| importance_of(item) >= min_importance)
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?.trim();
            if content.is_empty() {
                return None;
            }
            let memory_type = item
                .get("memory_type")
                .and_then(Value::as_str)
                .and_then(MemoryType::parse)
                .unwrap_or_default();
            Some(ExtractedMemory {
                content: content.to_string(),
                memory_type,
                importance: importance_of(item),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct MemoryExtractor {
    client: ModelClient,
    memory: MemoryTool,
}

impl MemoryExtractor {
    pub fn new(client: ModelClient, memory: MemoryTool) -> Self {
        Self { client, memory }
    }

    /// Ask the model which facts of the conversation are worth keeping
    ///
    /// Model failures and unreadable replies yield an empty list.
    pub async fn extract_memories(
        &self,
        messages: &[OpenAIMessage],
        min_importance: u8,
    ) -> Vec<ExtractedMemory> {
        let conversation = format_conversation(messages);
        if conversation.trim().is_empty() {
            return Vec::new();
        }

        let messages = vec![
            OpenAIMessage::system(MEMORY_EXTRACTOR_PROMPT),
            OpenAIMessage::user(conversation),
        ];

        match self
            .client
            .chat(messages, None, Some(EXTRACTOR_TEMPERATURE))
            .await
        {
            Ok(reply) => parse_extraction(reply.text(), min_importance),
            Err(e) => {
                warn!("⚠️ Memory extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Extract and store memories, returning how many were saved
    pub async fn auto_save_memories(
        &self,
        messages: &[OpenAIMessage],
        min_importance: u8,
    ) -> usize {
        let memories = self.extract_memories(messages, min_importance).await;
        if memories.is_empty() {
            debug!("💾 Auto-save: nothing worth saving");
            return 0;
        }

        info!("💾 Auto-save: saving {} memories", memories.len());
        let mut saved = 0;
        for memory in &memories {
            match self
                .memory
                .write(&memory.content, memory.memory_type, memory.importance, &[])
                .await
            {
                Ok(id) => {
                    let head: String = memory.content.chars().take(50).collect();
                    info!("   ✅ [{}] {} ({})", memory.memory_type, head, id);
                    saved += 1;
                }
                Err(e) => warn!("   ❌ Failed to save memory: {}", e),
            }
        }
        info!("💾 Saved {} memories", saved);
        saved
    }

    /// Only the last `recent_n` messages are analysed
    pub async fn auto_save_recent_memories(
        &self,
        messages: &[OpenAIMessage],
        recent_n: usize,
        min_importance: u8,
    ) -> usize {
        let start = messages.len().saturating_sub(recent_n);
        self.auto_save_memories(&messages[start..], min_importance)
            .await
    }
}
