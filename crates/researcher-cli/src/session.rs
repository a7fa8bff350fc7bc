use anyhow::Result;
use futures::StreamExt;

use crate::prompt::{InputType, Prompt};

use researcher::agent::Agent;

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    conversation_id: String,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<impl Prompt + 'a>) -> Self {
        let conversation_id = agent.new_conversation();
        Session {
            agent,
            prompt,
            conversation_id,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = &input.content {
                        self.process(content).await?;
                    }
                }
                InputType::NewConversation => {
                    self.conversation_id = self.agent.new_conversation();
                }
                InputType::AskAgain => continue,
                InputType::Exit => break,
            }
        }
        self.prompt.close();
        Ok(())
    }

    /// Answer a single question and return
    pub async fn headless_start(&mut self, query: &str) -> Result<()> {
        self.process(query).await?;
        self.prompt.close();
        Ok(())
    }

    async fn process(&mut self, query: &str) -> Result<()> {
        self.prompt.show_busy();
        let mut stream = self
            .agent
            .research_stream(query, Some(self.conversation_id.as_str()));
        loop {
            tokio::select! {
                fragment = stream.next() => {
                    match fragment {
                        Some(Ok((stage, text))) => self.prompt.render(stage, &text)?,
                        Some(Err(e)) => {
                            self.prompt.render_error(&e.to_string());
                            break;
                        }
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    // What already ran stays in the conversation
                    self.prompt.render_error("Interrupted");
                    break;
                }
            }
        }
        self.prompt.hide_busy();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Input;
    use researcher::agent::Stage;
    use researcher::models::message::Message;
    use researcher::providers::mock::MockProvider;

    #[derive(Default)]
    struct RecordingPrompt {
        inputs: Vec<&'static str>,
        rendered: Vec<(Stage, String)>,
        errors: Vec<String>,
    }

    impl Prompt for RecordingPrompt {
        fn render(&mut self, stage: Stage, text: &str) -> Result<()> {
            self.rendered.push((stage, text.to_string()));
            Ok(())
        }

        fn render_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn get_input(&mut self) -> Result<Input> {
            if self.inputs.is_empty() {
                return Ok(Input::parse("exit"));
            }
            Ok(Input::parse(self.inputs.remove(0)))
        }

        fn show_busy(&mut self) {}
        fn hide_busy(&mut self) {}
        fn close(&self) {}
        fn ready(&self) {}

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn agent(responses: Vec<Message>) -> Agent {
        Agent::new(Box::new(MockProvider::new(responses)))
    }

    fn recorded<'s>(session: &'s Session) -> &'s RecordingPrompt {
        session
            .prompt
            .as_any()
            .downcast_ref::<RecordingPrompt>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_chat_remembers_until_new_conversation() {
        let prompt = RecordingPrompt {
            inputs: vec!["first", "second", "/new", "third"],
            ..Default::default()
        };
        let mut session = Session::new(
            agent(vec![
                Message::assistant().with_text("one"),
                Message::assistant().with_text("two"),
                Message::assistant().with_text("three"),
            ]),
            Box::new(prompt),
        );
        let first_id = session.conversation_id().to_string();

        session.start().await.unwrap();

        let answers: Vec<&str> = recorded(&session)
            .rendered
            .iter()
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(answers, vec!["one", "two", "three"]);
        assert_ne!(session.conversation_id(), first_id);
        assert_eq!(session.agent.history(&first_id).unwrap().len(), 4);
        assert_eq!(
            session
                .agent
                .history(session.conversation_id())
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_headless_reports_backend_errors() {
        let provider = MockProvider::with_results(vec![Err("connection refused".to_string())]);
        let mut session = Session::new(
            Agent::new(Box::new(provider)),
            Box::new(RecordingPrompt::default()),
        );

        session.headless_start("anything").await.unwrap();

        let prompt = recorded(&session);
        assert!(prompt.rendered.is_empty());
        assert_eq!(prompt.errors.len(), 1);
        assert!(prompt.errors[0].contains("connection refused"));
    }
}
