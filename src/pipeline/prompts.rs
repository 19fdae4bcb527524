//! Prompt texts for every completion the pipeline makes.

/// Name of the database lookup capability the router may pick.
pub const DB_TOOL_NAME: &str = "db_data";

/// Stop sequence for the collection selector.
pub const SELECTOR_STOP: &str = "\nAnswer:";

/// Stop sequence for the query synthesizer.
pub const SYNTHESIS_STOP: &str = "\nJSON object:";

/// System instruction for the intent router.
pub const ROUTER_SYSTEM: &str = "You are a helpful assistant for the customer support platform Quadz. \
Not every message needs a tool: the user may just want to chat. These are the available tools:

db_data: fetches data from the database

When the user's message needs a tool, answer with only a JSON object with the keys \
'tool_name' and 'user_message', where 'user_message' is the user's message without modification. \
Otherwise answer the user directly.";

/// System instruction for the display-format classifier.
pub const DISPLAY_FORMAT_SYSTEM: &str = "Only detect whether the user wants the information as text or as a table, \
and answer with a JSON object whose 'output_format' key is 'text' or 'table'. \
For example, 'give me the tickets count' is text, and 'give me the tickets information' is table.";

/// System instruction for summarising a result table.
pub const SUMMARY_SYSTEM: &str = "Read data and return a sentence";

/// System instruction for the collection selector.
#[must_use]
pub fn selector_system(top_k: usize) -> String {
    format!(
        "You are a MongoDB expert. Given an input question, first work out which collections are needed, \
then check the collections schema and answer with their names.
Unless the question names specific collections, return at most {top_k} collections. \
Never return every collection in the database; return only those needed to answer the question. \
Wrap each collection name in double quotes (\").
Only use collection names you can see in the collections schema. Never return a collection that does not exist.
Return several collection names if the question is complex.

Use the following format:

Question: Question here
MongoDBCollections: MongoDB collections to use."
    )
}

/// User message for the collection selector.
#[must_use]
pub fn selector_user(question: &str, schema: &str) -> String {
    format!("Here is the collections schema:\n{schema}\n\nQuestion: {question}")
}

/// System instruction for the MongoDB query synthesizer.
#[must_use]
pub fn synthesis_system(default_limit: usize) -> String {
    format!(
        "You are a MongoDB expert. Given an input question, write a syntactically correct MongoDB aggregation \
pipeline that answers it.
Unless the question asks for a specific number of results, end the pipeline with a {{\"$limit\": {default_limit}}} stage. \
If the question asks for all the data, do not limit it. You can sort the results to return the most informative documents.
Never project every field of a collection; select only the fields needed to answer the question.
Use aggregation operators such as $lookup, $group and $unwind wherever they help.
Only use field names you can see in the collections below, and pay attention to which field belongs to which collection.
If the question involves \"today\", use the $$NOW variable for the current date.
Use date operators such as $dateSubtract and $dateAdd for date arithmetic; never compute dates yourself.
Do not include any explanation. Answer with only a JSON object in exactly this format:

{{\"collection\": name of the MongoDB collection to run the pipeline on, \"pipeline\": list of pipeline stages}}"
    )
}

/// User message for the MongoDB query synthesizer.
#[must_use]
pub fn synthesis_user(question: &str, schema: &str) -> String {
    format!("Only use the following collections:\n{schema}\n\nQuestion: {question}")
}
