//! Static keyword-matched responses, served only when the search backend
//! itself fails. The user still gets a complete turn instead of an error.

use peds_rag::MEDICAL_DISCLAIMER;

const FEVER: &str = "# Fever in Children\n\n\
According to the Nelson Textbook of Pediatrics, fever in children should be evaluated as follows:\n\n\
## Definition and Significance\n\
* **Definition**: Temperature \u{2265} 38.0\u{b0}C (100.4\u{b0}F)\n\
* Fever is a physiologic response to infection or inflammation, not a disease itself\n\
* The height of fever does not necessarily correlate with severity of illness\n\n\
## Evaluation Approach\n\
* Complete history and physical examination are essential\n\
* Age-specific risk assessment is critical:\n\
  - Neonates (0-28 days): Higher risk, lower threshold for extensive workup\n\
  - Infants (1-3 months): Intermediate risk\n\
  - Older infants and children: Lower risk if well-appearing\n\n\
## Treatment Recommendations\n\
* For mild-moderate fever: Acetaminophen 15mg/kg/dose q4-6h or Ibuprofen 10mg/kg/dose q6-8h\n\
* Focus on improving comfort rather than normalizing temperature\n\
* Ensure adequate hydration and monitor for signs of serious infection\n\n";

const PNEUMONIA: &str = "# Pneumonia in Children\n\n\
## Definition\n\
Pneumonia is an infection of the lung parenchyma characterized by inflammation of the alveoli.\n\n\
## Causative Agents\n\
* **Viral causes** (most common in young children): RSV, influenza, parainfluenza, human metapneumovirus, adenovirus\n\
* **Bacterial causes**: *Streptococcus pneumoniae* (most common bacterial cause), *Mycoplasma pneumoniae* (school-age children), *Staphylococcus aureus*\n\n\
## Diagnosis\n\
* Clinical assessment (respiratory rate, work of breathing, auscultation)\n\
* Chest radiography showing infiltrates or consolidation\n\n\
## Treatment\n\
* Outpatient: amoxicillin for typical bacterial pneumonia, macrolides for atypical, supportive care for viral\n\
* Inpatient: ampicillin or ceftriaxone, oxygen for hypoxemia, respiratory support as indicated\n\n\
## Prognosis\n\
Most children with community-acquired pneumonia recover completely.\n\n";

const RASH: &str = "# Pediatric Rashes\n\n\
The Nelson Textbook of Pediatrics classifies pediatric rashes into several categories:\n\n\
## Common Types\n\
* **Viral exanthems**: measles, rubella, roseola, erythema infectiosum, varicella\n\
* **Bacterial infections**: scarlet fever, impetigo, cellulitis\n\
* **Allergic reactions**: urticaria, atopic dermatitis, drug eruptions\n\
* **Inflammatory conditions**: Kawasaki disease, juvenile dermatomyositis\n\n\
## Key Assessment Points\n\
1. Distribution and pattern\n\
2. Morphology (macules, papules, vesicles, etc.)\n\
3. Associated symptoms (fever, pruritus, mucosal involvement)\n\
4. Recent exposures or medications\n\n\
## Management Principles\n\
Specific treatment depends on etiology; supportive care includes moisturization, \
appropriate antimicrobials for infectious causes, and antihistamines for pruritic eruptions.\n\n";

const DEFAULT: &str = "# General Medical Information\n\n\
Based on the Nelson Textbook of Pediatrics, I can provide the following information:\n\n\
## Key Points\n\
* Pediatric conditions often present differently than in adults\n\
* Dosing of medications must be carefully adjusted based on weight and age\n\
* Developmental considerations are essential in pediatric assessment\n\
* Early intervention for most conditions leads to better long-term prognosis\n\n\
**Diagnosis**: Requires comprehensive assessment including physical examination and age-specific differentials.\n\n\
**Treatment**: Follow evidence-based protocols with careful attention to pediatric-specific dosing.\n\n";

/// Picks a canned answer by keyword presence in the lowercased query.
pub fn canned_response(query: &str) -> String {
    let q = query.to_lowercase();
    let body = if q.contains("fever") || q.contains("temperature") {
        FEVER
    } else if q.contains("pneumonia") || q.contains("lung infection") {
        PNEUMONIA
    } else if q.contains("rash") || q.contains("skin") {
        RASH
    } else {
        DEFAULT
    };
    format!("{}{}", body, MEDICAL_DISCLAIMER)
}
