//! Prompt texts of the two chains.

/// System prompt prefix of the conversational chain; plugins rewrite it
/// through `agent_prompt_prefix`.
pub const DEFAULT_PREFIX: &str = "You are Hearth, a friendly assistant.\n\
You answer Human questions truthfully and briefly, using the context below when it helps.\n";

/// System prompt suffix; rendered with the agent context.
pub const DEFAULT_SUFFIX: &str =
    "\n# Context\n\n{episodic_memory}\n\n{declarative_memory}\n\n{tools_output}\n";

/// Conversation part of the conversational chain.
pub const CONVERSATION: &str =
    "## Conversation until now:{chat_history}\n - Human: {input}\n - AI: ";

/// Instructions of the procedure selection chain; plugins rewrite them through
/// `agent_prompt_instructions`.
pub const DEFAULT_INSTRUCTIONS: &str =
    "Create a JSON with the correct \"action\" and \"action_input\" to help the Human.\n\
You can use one of these actions:\n\
{tools}\n\
- \"final_answer\": Use this action to finish once you have what you need. Input is always null.\n\
- \"none_of_the_others\": Use this action if none of the other actions help. \
Input is always null.\n\n\
## To add an action, use only the following format:\n\
```json\n\
{\n    \"action\": // str - The name of the action to take, should be one of [{tool_names}, \"final_answer\", \"none_of_the_others\"]\n    \"action_input\": // str or null - The input to the action according to its description\n}\n\
```\n\n\
{examples}";

pub const FINAL_ANSWER: &str = "final_answer";
pub const NONE_OF_THE_OTHERS: &str = "none_of_the_others";

/// Apology returned when a turn fails.
pub const APOLOGY: &str =
    "I'm sorry, something went wrong while I was answering. Please try again.";

/// User prompt of one selection iteration.
pub fn selection_prompt(chat_history: &str, input: &str, scratchpad: &str) -> String {
    format!(
        "## Conversation until now:{chat_history}\n - Human: {input}\n\n\
         ## Actions sequence used until now:{scratchpad}\n\n\
         ## Next action:\n"
    )
}
