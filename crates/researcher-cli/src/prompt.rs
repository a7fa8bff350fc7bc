use anyhow::Result;
use researcher::agent::Stage;

pub mod cliclack;

pub trait Prompt {
    /// Show one fragment of a streamed reply
    fn render(&mut self, stage: Stage, text: &str) -> Result<()>;
    fn render_error(&mut self, error: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn ready(&self) {
        println!("\n");
        println!("Ask a question. The assistant searches the web when it needs to.");
        println!("\n");
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, PartialEq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain,        // Ask the user for input again. Control flow command.
    Message,         // User sent a message
    NewConversation, // Forget the current conversation and start another
    Exit,            // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}

impl Input {
    fn command(input_type: InputType) -> Self {
        Input {
            input_type,
            content: None,
        }
    }

    /// Interpret a line typed at the chat prompt
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Input::command(InputType::AskAgain)
        } else if ["exit", "/exit", "/quit"]
            .iter()
            .any(|cmd| text.eq_ignore_ascii_case(cmd))
        {
            Input::command(InputType::Exit)
        } else if text.eq_ignore_ascii_case("/new") {
            Input::command(InputType::NewConversation)
        } else {
            Input {
                input_type: InputType::Message,
                content: Some(text.to_string()),
            }
        }
    }
}
