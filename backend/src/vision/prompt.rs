use shared::Department;

pub const SYSTEM_PROMPT: &str = "You are a Smart City assistant that identifies urban problems in photos \
and assigns each one to the municipal department responsible for fixing it. \
The departments and what they handle are:\n\
1. salubrizare (sanitation): full or damaged trash bins, overflowing recycling containers, \
irregularities at recycling points, cleaning of streets, parks and public areas.\n\
2. politie (police): illegal graffiti, illegal parking, illegal street trading on sidewalks, \
bicycles or scooters abandoned across the sidewalk, vandalism, suspicious activity, law violations.\n\
3. primarie (city hall): buildings in a state of decay and any municipal issue no other department covers.\n\
4. spatii_verzi (green spaces): uncut grass, fallen trees or dangerous broken branches, \
park maintenance, planting and care of trees and shrubs, landscaping.\n\
5. iluminat_public (public lighting): broken street lamps, public lighting left on during the day, \
maintenance of the public lighting network.\n\
6. drumuri_publice (public roads): potholes, missing or damaged traffic signs, repair of roads, \
sidewalks and alleys, road infrastructure upkeep.\n\
For every image pick exactly ONE responsible department, the one matching the main or most serious problem, \
even if several problems are visible. Put only the department label in detected_category. \
If the image shows no problem at all, use ok. \
Rate the urgency of intervention from 1 (minimal) to 10 (maximal).";

const REPLY_INSTRUCTION: &str = "Analyze this image and identify any urban problem present. \
Reply ONLY with JSON using exactly this structure: \
{\"detected_category\": \"<exactly one of: salubrizare, politie, primarie, iluminat_public, spatii_verzi, drumuri_publice, ok>\", \
\"severity_score\": <number from 1 to 10, 1 minimal and 10 maximal>, \
\"estimated_fix_time\": \"<estimated time to fix, e.g. 2 hours, 1 day>\", \
\"description\": \"<one short sentence describing the problem>\"}. \
Do not include any other text.";

/// Text part of the user message, including whatever the reporter told us.
pub fn user_instruction(category_hint: Option<&str>, description: Option<&str>) -> String {
    let mut text = REPLY_INSTRUCTION.to_string();

    if let Some(hint) = category_hint.map(str::trim).filter(|h| !h.is_empty()) {
        match Department::from_label(hint) {
            Some(department) if !department.is_sentinel() => text.push_str(&format!(
                "\nThe reporter filed this under the {} department; use it only if the image agrees.",
                department
            )),
            _ => text.push_str(&format!(
                "\nThe reporter filed this under the category \"{}\"; use it only if the image agrees.",
                hint
            )),
        }
    }
    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        text.push_str(&format!("\nReporter's description: \"{}\"", description));
    }
    text
}
