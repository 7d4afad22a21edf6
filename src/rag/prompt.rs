//! Grounded answer prompt for the `query` command

use crate::models::openai::OpenAIMessage;
use crate::tools::rag_tool::SearchResult;

const GROUNDED_SYSTEM_PROMPT: &str = "\
당신은 수업 자료를 바탕으로 질문에 답하는 조교입니다.
아래에 주어진 [자료]만 근거로 한국어로 답변하세요.
자료에 없는 내용은 추측하지 말고 \"수업 자료에서 찾을 수 없습니다.\"라고 답하세요.
답변 끝에 참고한 자료의 출처(파일명, 청크 번호)를 적으세요.";

/// System + user messages asking for an answer grounded in `contexts`
pub fn build_prompt(query: &str, contexts: &[SearchResult]) -> Vec<OpenAIMessage> {
    let mut material = String::new();
    for (i, context) in contexts.iter().enumerate() {
        material.push_str(&format!(
            "[자료 {}] 출처: {} (청크 {})\n{}\n\n",
            i + 1,
            context.source,
            context.chunk_id,
            context.content.trim()
        ));
    }

    vec![
        OpenAIMessage::system(GROUNDED_SYSTEM_PROMPT),
        OpenAIMessage::user(format!(
            "[자료]\n{}[질문]\n{}",
            material,
            query.trim()
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rank: usize, source: &str, chunk: i64, content: &str) -> SearchResult {
        SearchResult {
            rank,
            content: content.to_string(),
            source: source.to_string(),
            chunk_id: json!(chunk),
            embedding_similarity: 0.5,
            similarity: 0.5,
            rerank_score: None,
        }
    }

    #[test]
    fn test_build_prompt_numbers_sources() {
        let messages = build_prompt(
            " ReAct 패턴이란? ",
            &[
                result(1, "react.pdf", 3, "Thought, Action, Observation"),
                result(2, "graph.pdf", 0, "StateGraph"),
            ],
        );

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let user = messages[1].text();
        assert!(user.contains("[자료 1] 출처: react.pdf (청크 3)\nThought, Action, Observation"));
        assert!(user.contains("[자료 2] 출처: graph.pdf (청크 0)"));
        assert!(user.ends_with("[질문]\nReAct 패턴이란?"));
    }
}
